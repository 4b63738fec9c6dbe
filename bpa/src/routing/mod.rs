use super::*;
use neighbors::Neighbor;
use thiserror::Error;

pub mod energy;
pub mod static_routes;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("No route to {0}")]
    NoRoute(String),

    #[error("Router weights must be non-negative and sum to 1, got {quality} and {energy}")]
    InvalidWeights { quality: f64, energy: f64 },

    #[error("Router threshold {0} is out of range")]
    InvalidThreshold(f64),
}

/// A next-hop selection policy.
///
/// Implementations only read the snapshot they are given and hold no
/// reference to it afterwards. Any active neighbor may be returned; an empty
/// or all-inactive snapshot is [`Error::NoRoute`].
pub trait Router: Send + Sync {
    fn select_next_hop(&self, bundle: &bundle::Bundle, neighbors: &[Neighbor]) -> Result<String>;
}

fn no_route(bundle: &bundle::Bundle) -> Error {
    Error::NoRoute(bundle.destination().to_string())
}
