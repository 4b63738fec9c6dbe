use super::*;
use neighbors::Neighbor;

pub type Error = Box<dyn core::error::Error + Send + Sync>;
pub type Result<T> = core::result::Result<T, Error>;

/// The link boundary: hands a bundle to whatever carries it to `next_hop`.
///
/// A returned error marks the stored copy failed. Delivery at the far end
/// arrives through the peer's `Node::receive_bundle`.
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn transmit(&self, next_hop: &Neighbor, bundle: bundle::Bundle) -> Result<()>;
}

/// Discards everything it is given.
#[derive(Debug, Default)]
pub struct NullTransmitter;

#[async_trait]
impl Transmitter for NullTransmitter {
    async fn transmit(&self, next_hop: &Neighbor, bundle: bundle::Bundle) -> Result<()> {
        debug!("Discarding {bundle} for {}", next_hop.id);
        Ok(())
    }
}
