use super::*;

/// The local consumer of bundles addressed to this node.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, bundle: bundle::Bundle);
}

/// Logs and drops delivered bundles.
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    async fn deliver(&self, bundle: bundle::Bundle) {
        info!("Delivered {bundle}");
    }
}
