use super::*;

/// Node tuning. Durations are whole seconds in configuration files.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub ingress_queue_depth: std::num::NonZeroUsize,
    pub egress_queue_depth: std::num::NonZeroUsize,

    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub sweep_interval: time::Duration,

    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub default_lifetime: time::Duration,

    pub max_hop_count: u32,

    /// Neighbors silent for longer than this are marked inactive.
    #[cfg_attr(feature = "serde", serde(with = "seconds"))]
    pub neighbor_timeout: time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingress_queue_depth: default_queue_depth(),
            egress_queue_depth: default_queue_depth(),
            sweep_interval: time::Duration::minutes(5),
            default_lifetime: bundle::DEFAULT_LIFETIME,
            max_hop_count: bundle::MAX_HOP_COUNT,
            neighbor_timeout: time::Duration::minutes(10),
        }
    }
}

fn default_queue_depth() -> std::num::NonZeroUsize {
    std::num::NonZeroUsize::new(1000).trace_expect("Non-zero constant")
}

#[cfg(feature = "serde")]
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &time::Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.whole_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<time::Duration, D::Error> {
        u64::deserialize(d).map(|secs| time::Duration::seconds(secs.min(i64::MAX as u64) as i64))
    }
}
