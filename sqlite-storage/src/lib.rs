//! Persistent [`BundleStorage`](satnet_bpa::storage::BundleStorage) on SQLite.
//!
//! The schema lives in `schemas/` and is applied through versioned
//! migrations; an existing database is only upgraded when asked to.

mod config;
mod migrate;
mod storage;

pub use config::Config;

use trace_err::*;
use tracing::{debug, info};

#[cfg(feature = "instrument")]
use tracing::instrument;

use rusqlite::OptionalExtension;

/// Key of this engine in daemon configuration.
pub const CONFIG_KEY: &str = "sqlite";

/// Opens (creating if missing) the database described by `config`.
///
/// An existing database with an older schema is only migrated when
/// `upgrade` is set. Startup failures are fatal.
pub fn new(
    config: &config::Config,
    upgrade: bool,
) -> std::sync::Arc<dyn satnet_bpa::storage::BundleStorage> {
    std::sync::Arc::new(storage::Storage::new(config, upgrade))
}
