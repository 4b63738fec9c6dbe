//! Delay-tolerant store-and-forward transport.
//!
//! A [`node::Node`] holds every [`bundle::Bundle`] it has custody of in a
//! [`storage::BundleStorage`] until its [`routing::Router`] finds an eligible
//! neighbor, then hands it to a [`cla::Transmitter`]. Bundles addressed to
//! the node itself go to a local [`service::Delivery`].
//! A background sweep retires bundles whose lifetime has elapsed.
//!
//! Topology input arrives through [`topology::TopologyManager`], which turns
//! position and battery telemetry into neighbor updates for a node.

pub mod bundle;
pub mod cla;
pub mod config;
pub mod metadata;
pub mod neighbors;
pub mod node;
pub mod routing;
pub mod service;
pub mod storage;
pub mod topology;

use std::sync::Arc;
use trace_err::*;
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "instrument")]
use tracing::instrument;

// Re-exported for implementors of the storage, cla and service traits
pub use async_trait::async_trait;
pub use bytes::Bytes;
