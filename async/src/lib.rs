//! Async primitives shared by the satnet DTN crates.
//!
//! A node runs a handful of long-lived workers (ingress, egress, expiry
//! sweep) that must all stop on one signal. This crate keeps the runtime
//! specific pieces of that pattern in one place:
//!
//! - [`TaskPool`]: spawns tracked workers and shuts them down together
//! - [`CancellationToken`]: the shared stop signal
//! - [`Notify`]: a single-waiter wake-up used to re-drive idle workers
//!
//! # Example
//!
//! ```no_run
//! use satnet_async::TaskPool;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let pool = TaskPool::new();
//! let cancel = pool.cancel_token().clone();
//!
//! pool.spawn_named("sweeper", async move {
//!     loop {
//!         tokio::select! {
//!             _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
//!             _ = cancel.cancelled() => break,
//!         }
//!     }
//! });
//!
//! pool.shutdown().await;
//! # });
//! ```

pub mod cancellation_token;
pub mod notify;
#[cfg(feature = "tokio")]
pub mod task_pool;

#[cfg(feature = "tokio")]
pub use cancellation_token::CancellationToken;
#[cfg(feature = "tokio")]
pub use notify::Notify;
#[cfg(feature = "tokio")]
pub use task_pool::TaskPool;
