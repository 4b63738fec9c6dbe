use super::*;
use metadata::BundleStatus;
use thiserror::Error;

pub mod bundle_mem;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Bundle {0} not found")]
    NotFound(bundle::Id),

    #[error(transparent)]
    Invalid(#[from] bundle::Error),

    #[error("Bundle {id} is {from}, it cannot become {to}")]
    TerminalStatus {
        id: bundle::Id,
        from: BundleStatus,
        to: BundleStatus,
    },

    #[error("Storage is full of bundles still in custody")]
    Full,

    #[error(transparent)]
    Internal(#[from] Box<dyn core::error::Error + Send + Sync>),
}

/// Sort order for [`BundleStorage::list`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Order {
    /// Highest priority first, oldest first within a priority.
    #[default]
    Priority,
    /// Oldest stored first.
    Age,
    /// Smallest first.
    Size,
}

/// Conjunctive selection criteria: unset fields match everything.
#[derive(Debug, Default, Clone)]
pub struct Filter {
    pub destination: Option<String>,
    pub source: Option<String>,
    pub status: Option<BundleStatus>,
    pub min_priority: Option<bundle::Priority>,
    /// Only bundles stored within this long ago.
    pub max_age: Option<time::Duration>,
    pub limit: Option<usize>,
    pub order: Order,
}

impl Filter {
    pub fn with_status(status: BundleStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &Record, now: time::OffsetDateTime) -> bool {
        if let Some(destination) = &self.destination
            && record.bundle.destination() != destination
        {
            return false;
        }
        if let Some(source) = &self.source
            && record.bundle.source() != source
        {
            return false;
        }
        if let Some(status) = self.status
            && record.status != status
        {
            return false;
        }
        if let Some(min_priority) = self.min_priority
            && record.bundle.priority() < min_priority
        {
            return false;
        }
        if let Some(max_age) = self.max_age
            && now - record.stored_at > max_age
        {
            return false;
        }
        true
    }

    /// Filters, orders and truncates a candidate set.
    ///
    /// Backends that cannot express the whole filter natively can pre-select
    /// with whatever they support and finish here.
    pub fn apply(&self, records: impl IntoIterator<Item = Record>) -> Vec<bundle::Bundle> {
        let now = time::OffsetDateTime::now_utc();
        let mut records = records
            .into_iter()
            .filter(|r| self.matches(r, now))
            .collect::<Vec<_>>();

        match self.order {
            Order::Priority => records.sort_by(|a, b| {
                b.bundle
                    .priority()
                    .cmp(&a.bundle.priority())
                    .then(a.stored_at.cmp(&b.stored_at))
            }),
            Order::Age => records.sort_by(|a, b| a.stored_at.cmp(&b.stored_at)),
            Order::Size => records.sort_by_key(|r| r.bundle.size()),
        }

        if let Some(limit) = self.limit {
            records.truncate(limit);
        }
        records.into_iter().map(|r| r.bundle).collect()
    }
}

/// A stored copy with its custody bookkeeping.
#[derive(Debug, Clone)]
pub struct Record {
    pub bundle: bundle::Bundle,
    pub status: BundleStatus,
    pub stored_at: time::OffsetDateTime,
}

/// Checks a status change against the terminal-state rule.
///
/// Re-applying the current status is always accepted.
pub fn check_transition(id: bundle::Id, from: BundleStatus, to: BundleStatus) -> Result<()> {
    if from.is_terminal() && from != to {
        Err(Error::TerminalStatus { id, from, to })
    } else {
        Ok(())
    }
}

/// Persistence for bundles and their custody status.
///
/// Every bundle crossing this boundary is a copy: callers never share state
/// with the stored instance. Operations on a single id are linearizable.
#[async_trait]
pub trait BundleStorage: Send + Sync {
    /// Stores a copy of `bundle` with status [`BundleStatus::Pending`].
    ///
    /// Invalid or expired bundles are rejected. Returns `false` if the id is
    /// already held, in which case the existing copy and status are kept.
    /// A store that cannot make room without dropping a copy still in
    /// custody fails with [`Error::Full`].
    async fn store(&self, bundle: &bundle::Bundle) -> Result<bool>;

    /// Overwrites the held copy of `bundle`, keeping its status and age.
    async fn replace(&self, bundle: &bundle::Bundle) -> Result<()>;

    async fn retrieve(&self, id: &bundle::Id) -> Result<bundle::Bundle>;

    async fn delete(&self, id: &bundle::Id) -> Result<()>;

    /// A snapshot of the bundles matching `filter`.
    async fn list(&self, filter: &Filter) -> Result<Vec<bundle::Bundle>>;

    /// The only way a copy changes status. Terminal states are final.
    async fn update_status(&self, id: &bundle::Id, status: BundleStatus) -> Result<()>;

    async fn status(&self, id: &bundle::Id) -> Result<BundleStatus>;

    async fn count(&self) -> Result<usize>;

    /// Removes every expired bundle, returning how many went.
    async fn purge_expired(&self) -> Result<usize>;
}
