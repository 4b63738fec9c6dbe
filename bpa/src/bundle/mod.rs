use super::*;
use sha2::Digest;
use thiserror::Error;

mod builder;

pub use builder::Builder;

/// The only protocol version this node produces or accepts.
pub const VERSION: u8 = 7;

/// Hard ceiling on the number of times a bundle may be relayed.
pub const MAX_HOP_COUNT: u32 = 255;

/// Lifetime given to bundles that do not ask for one.
pub const DEFAULT_LIFETIME: time::Duration = time::Duration::hours(24);

pub type Result<T> = core::result::Result<T, Error>;

/// Reasons a bundle fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid bundle version {0}, expected 7")]
    InvalidVersion(u8),

    #[error("Bundle has an empty source endpoint")]
    EmptySource,

    #[error("Bundle has an empty destination endpoint")]
    EmptyDestination,

    #[error("Hop count {hop_count} exceeds the limit of {limit}")]
    HopLimitExceeded { hop_count: u32, limit: u32 },

    #[error("Bundle expired at {0}")]
    Expired(time::OffsetDateTime),

    #[error("Invalid priority {0}, must be 0-2")]
    InvalidPriority(u8),
}

/// Globally unique bundle identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Id(uuid::Uuid);

impl Id {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Class of service, lowest first.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Priority {
    Bulk = 0,
    #[default]
    Normal = 1,
    Expedited = 2,
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Bulk),
            1 => Ok(Self::Normal),
            2 => Ok(Self::Expedited),
            v => Err(Error::InvalidPriority(v)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value as u8
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Bulk => f.write_str("bulk"),
            Priority::Normal => f.write_str("normal"),
            Priority::Expedited => f.write_str("expedited"),
        }
    }
}

/// Integrity check requested by the producer. Informational only.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CrcType {
    None = 0,
    #[default]
    Crc16 = 1,
    Crc32 = 2,
}

/// The unit of store-and-forward transport.
///
/// Content (addressing, lifetime, payload) is fixed once built. The only
/// changes allowed afterwards are transit annotations made through
/// [`Bundle::increment_hop`] and the class of service via
/// [`Bundle::set_priority`].
///
/// Two bundles compare equal when their ids match: they are copies of the
/// same logical message, whatever their transit state.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bundle {
    id: Id,
    version: u8,
    flags: u64,
    destination: String,
    source: String,
    report_to: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    creation_time: time::OffsetDateTime,
    lifetime: time::Duration,
    payload: Bytes,
    crc_type: CrcType,
    previous_node: Option<String>,
    hop_count: u32,
    priority: Priority,
}

impl Bundle {
    /// Creates a bundle with default lifetime and priority, stamped now.
    pub fn create(source: &str, destination: &str, payload: impl Into<Bytes>) -> Self {
        Builder::new(source, destination).payload(payload).build()
    }

    pub fn builder(source: &str, destination: &str) -> Builder {
        Builder::new(source, destination)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn report_to(&self) -> &str {
        &self.report_to
    }

    pub fn creation_time(&self) -> time::OffsetDateTime {
        self.creation_time
    }

    pub fn lifetime(&self) -> time::Duration {
        self.lifetime
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn crc_type(&self) -> CrcType {
        self.crc_type
    }

    pub fn previous_node(&self) -> Option<&str> {
        self.previous_node.as_deref()
    }

    pub fn hop_count(&self) -> u32 {
        self.hop_count
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn expires_at(&self) -> time::OffsetDateTime {
        self.creation_time.saturating_add(self.lifetime)
    }

    /// Recomputed against the wall clock on every call.
    pub fn is_expired(&self) -> bool {
        time::OffsetDateTime::now_utc() > self.expires_at()
    }

    pub fn remaining_lifetime(&self) -> time::Duration {
        let remaining = self.expires_at() - time::OffsetDateTime::now_utc();
        if remaining.is_negative() {
            time::Duration::ZERO
        } else {
            remaining
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != VERSION {
            return Err(Error::InvalidVersion(self.version));
        }
        if self.source.is_empty() {
            return Err(Error::EmptySource);
        }
        if self.destination.is_empty() {
            return Err(Error::EmptyDestination);
        }
        self.check_hop_limit(MAX_HOP_COUNT)?;
        if self.is_expired() {
            return Err(Error::Expired(self.expires_at()));
        }
        Ok(())
    }

    /// Fails if the bundle has been relayed more than `limit` times.
    pub fn check_hop_limit(&self, limit: u32) -> Result<()> {
        if self.hop_count > limit {
            Err(Error::HopLimitExceeded {
                hop_count: self.hop_count,
                limit,
            })
        } else {
            Ok(())
        }
    }

    pub fn set_priority(&mut self, priority: u8) -> Result<()> {
        self.priority = priority.try_into()?;
        Ok(())
    }

    /// Records one more relay through `node_id`.
    ///
    /// The count is allowed to pass the ceiling: callers must follow up with
    /// [`Bundle::check_hop_limit`] and drop the bundle if it fails.
    pub fn increment_hop(&mut self, node_id: &str) {
        self.hop_count = self.hop_count.saturating_add(1);
        self.previous_node = Some(node_id.to_string());
    }

    /// Claims the bundle for the originating node before it is first stored.
    pub(crate) fn stamp_source(&mut self, endpoint: &str) {
        if self.report_to.is_empty() || self.report_to == self.source {
            self.report_to = endpoint.to_string();
        }
        self.source = endpoint.to_string();
    }

    /// Approximate encoded size: a fixed header allowance plus the variable fields.
    pub fn size(&self) -> usize {
        64 + self.source.len()
            + self.destination.len()
            + self.report_to.len()
            + self.previous_node.as_ref().map_or(0, String::len)
            + self.payload.len()
    }

    /// SHA-256 over identity, addressing and payload, as lowercase hex.
    pub fn hash(&self) -> String {
        let mut hasher = sha2::Sha256::new();
        hasher.update(self.id.to_string().as_bytes());
        hasher.update(self.source.as_bytes());
        hasher.update(self.destination.as_bytes());
        hasher.update(&self.payload);
        hex::encode(hasher.finalize())
    }
}

impl PartialEq for Bundle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Bundle {}

impl std::hash::Hash for Bundle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.id.to_string();
        write!(
            f,
            "Bundle[id={}, src={}, dst={}, priority={}, hops={}, size={}]",
            &id[..8],
            self.source,
            self.destination,
            self.priority,
            self.hop_count,
            self.size()
        )
    }
}
