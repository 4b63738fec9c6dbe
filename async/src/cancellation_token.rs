//! The stop signal observed by every worker a [`TaskPool`](crate::TaskPool) owns.
//!
//! Cancelling a parent token cancels all of its children, so a node can hand
//! out child tokens to sub-tasks without giving them the power to stop the
//! whole node.

/// Cooperative cancellation signal.
///
/// Aliased so that callers never name `tokio_util` directly.
#[cfg(feature = "tokio")]
pub type CancellationToken = tokio_util::sync::CancellationToken;
