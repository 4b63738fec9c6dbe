use super::*;
use std::sync::RwLock;

/// A node-local view of a reachable peer. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub endpoint: String,
    /// Normalized connection reliability, clamped to `[0, 1]`.
    pub link_quality: f64,
    pub last_contact: time::OffsetDateTime,
    pub active: bool,
    /// Battery state of the peer, when telemetry reports one.
    pub battery_percent: Option<f64>,
}

impl Neighbor {
    pub fn new(id: &str, endpoint: &str, link_quality: f64) -> Self {
        Self {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            link_quality: link_quality.clamp(0.0, 1.0),
            last_contact: time::OffsetDateTime::now_utc(),
            active: true,
            battery_percent: None,
        }
    }

    pub fn with_battery(mut self, battery_percent: f64) -> Self {
        self.battery_percent = Some(battery_percent);
        self
    }
}

struct Slot {
    seq: u64,
    neighbor: Neighbor,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    slots: hashbrown::HashMap<String, Slot>,
}

/// Neighbor table keyed by neighbor id.
///
/// Snapshots come back in first-seen order, which routers use to break ties.
#[derive(Default)]
pub(crate) struct NeighborTable {
    inner: RwLock<Inner>,
}

impl NeighborTable {
    /// Inserts or replaces. Returns `true` if an active neighbor was added
    /// or an existing one became active or better connected.
    pub fn upsert(&self, neighbor: Neighbor) -> bool {
        let mut inner = self.inner.write().trace_expect("Failed to lock neighbor table");
        let improved = neighbor.active
            && inner.slots.get(&neighbor.id).is_none_or(|s| {
                !s.neighbor.active || neighbor.link_quality > s.neighbor.link_quality
            });

        if let Some(slot) = inner.slots.get_mut(&neighbor.id) {
            slot.neighbor = neighbor;
        } else {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner
                .slots
                .insert(neighbor.id.clone(), Slot { seq, neighbor });
        }
        improved
    }

    pub fn remove(&self, id: &str) -> Option<Neighbor> {
        self.inner
            .write()
            .trace_expect("Failed to lock neighbor table")
            .slots
            .remove(id)
            .map(|s| s.neighbor)
    }

    /// Sets the link quality and refreshes contact. Returns `None` for an
    /// unknown id, otherwise whether the neighbor improved.
    pub fn update_quality(&self, id: &str, link_quality: f64) -> Option<bool> {
        let mut inner = self.inner.write().trace_expect("Failed to lock neighbor table");
        let slot = inner.slots.get_mut(id)?;
        let link_quality = link_quality.clamp(0.0, 1.0);
        let improved = !slot.neighbor.active || link_quality > slot.neighbor.link_quality;
        slot.neighbor.link_quality = link_quality;
        slot.neighbor.last_contact = time::OffsetDateTime::now_utc();
        slot.neighbor.active = true;
        Some(improved)
    }

    /// Marks neighbors silent since before `cutoff` inactive, returning their ids.
    pub fn deactivate_stale(&self, cutoff: time::OffsetDateTime) -> Vec<String> {
        let mut inner = self.inner.write().trace_expect("Failed to lock neighbor table");
        inner
            .slots
            .values_mut()
            .filter(|s| s.neighbor.active && s.neighbor.last_contact < cutoff)
            .map(|s| {
                s.neighbor.active = false;
                s.neighbor.id.clone()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .trace_expect("Failed to lock neighbor table")
            .slots
            .len()
    }

    /// An owned copy of the table in first-seen order.
    pub fn snapshot(&self) -> Vec<Neighbor> {
        let inner = self.inner.read().trace_expect("Failed to lock neighbor table");
        let mut slots = inner.slots.values().collect::<Vec<_>>();
        slots.sort_unstable_by_key(|s| s.seq);
        slots.into_iter().map(|s| s.neighbor.clone()).collect()
    }
}
