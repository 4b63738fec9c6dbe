use super::*;
use std::sync::Mutex;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    #[cfg_attr(feature = "serde", serde(rename = "max-bundles"))]
    pub max_bundles: core::num::NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_bundles: core::num::NonZeroUsize::new(10_000).trace_expect("Non-zero constant"),
        }
    }
}

struct Storage {
    entries: Mutex<hashbrown::HashMap<bundle::Id, Record>>,
    max_bundles: usize,
}

impl Storage {
    fn evict_expired(entries: &mut hashbrown::HashMap<bundle::Id, Record>) -> usize {
        let before = entries.len();
        entries.retain(|_, r| !r.bundle.is_expired());
        before - entries.len()
    }

    /// Drops the lowest priority, oldest copy that has left custody.
    fn evict_finished(entries: &mut hashbrown::HashMap<bundle::Id, Record>) -> bool {
        let Some(victim) = entries
            .values()
            .filter(|r| r.status.is_terminal())
            .min_by(|a, b| {
                a.bundle
                    .priority()
                    .cmp(&b.bundle.priority())
                    .then(a.stored_at.cmp(&b.stored_at))
            })
            .map(|r| r.bundle.id())
        else {
            return false;
        };
        debug!("Store full, evicting finished bundle {victim}");
        entries.remove(&victim);
        true
    }
}

#[async_trait]
impl BundleStorage for Storage {
    async fn store(&self, bundle: &bundle::Bundle) -> storage::Result<bool> {
        bundle.validate()?;

        let mut entries = self.entries.lock().trace_expect("Failed to lock mutex");
        if entries.contains_key(&bundle.id()) {
            return Ok(false);
        }

        if entries.len() >= self.max_bundles
            && Self::evict_expired(&mut entries) == 0
            && !Self::evict_finished(&mut entries)
        {
            warn!("Store full, rejecting {bundle}");
            return Err(Error::Full);
        }

        entries.insert(
            bundle.id(),
            Record {
                bundle: bundle.clone(),
                status: BundleStatus::Pending,
                stored_at: time::OffsetDateTime::now_utc(),
            },
        );
        Ok(true)
    }

    async fn retrieve(&self, id: &bundle::Id) -> storage::Result<bundle::Bundle> {
        self.entries
            .lock()
            .trace_expect("Failed to lock mutex")
            .get(id)
            .map(|r| r.bundle.clone())
            .ok_or(Error::NotFound(*id))
    }

    async fn replace(&self, bundle: &bundle::Bundle) -> storage::Result<()> {
        let mut entries = self.entries.lock().trace_expect("Failed to lock mutex");
        let record = entries
            .get_mut(&bundle.id())
            .ok_or(Error::NotFound(bundle.id()))?;
        record.bundle = bundle.clone();
        Ok(())
    }

    async fn delete(&self, id: &bundle::Id) -> storage::Result<()> {
        self.entries
            .lock()
            .trace_expect("Failed to lock mutex")
            .remove(id)
            .map(|_| ())
            .ok_or(Error::NotFound(*id))
    }

    async fn list(&self, filter: &Filter) -> storage::Result<Vec<bundle::Bundle>> {
        let candidates = self
            .entries
            .lock()
            .trace_expect("Failed to lock mutex")
            .values()
            .cloned()
            .collect::<Vec<_>>();
        Ok(filter.apply(candidates))
    }

    async fn update_status(&self, id: &bundle::Id, status: BundleStatus) -> storage::Result<()> {
        let mut entries = self.entries.lock().trace_expect("Failed to lock mutex");
        let record = entries.get_mut(id).ok_or(Error::NotFound(*id))?;
        check_transition(*id, record.status, status)?;
        record.status = status;
        Ok(())
    }

    async fn status(&self, id: &bundle::Id) -> storage::Result<BundleStatus> {
        self.entries
            .lock()
            .trace_expect("Failed to lock mutex")
            .get(id)
            .map(|r| r.status)
            .ok_or(Error::NotFound(*id))
    }

    async fn count(&self) -> storage::Result<usize> {
        Ok(self.entries.lock().trace_expect("Failed to lock mutex").len())
    }

    async fn purge_expired(&self) -> storage::Result<usize> {
        Ok(Self::evict_expired(
            &mut self.entries.lock().trace_expect("Failed to lock mutex"),
        ))
    }
}

pub fn new(config: &Config) -> Arc<dyn BundleStorage> {
    Arc::new(Storage {
        entries: Mutex::new(hashbrown::HashMap::new()),
        max_bundles: config.max_bundles.get(),
    })
}
