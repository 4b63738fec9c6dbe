use super::*;

impl Node {
    pub(super) async fn run_reaper(self: Arc<Self>) {
        let cancel_token = self.tasks.cancel_token().clone();
        let period = std::time::Duration::try_from(self.config.sweep_interval)
            .unwrap_or(std::time::Duration::from_secs(1))
            .max(std::time::Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                    self.check_neighbors();
                    self.redrive_pending().await;
                },
                _ = self.redrive.notified() => {
                    self.redrive_pending().await;
                },
                _ = cancel_token.cancelled() => break,
            }
        }
        debug!("Reaper worker stopped");
    }

    /// Marks every expired bundle `expired` and deletes it. Returns how many went.
    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    pub async fn sweep(&self) -> usize {
        let bundles = match self.store.list(&storage::Filter::default()).await {
            Ok(bundles) => bundles,
            Err(e) => {
                error!("Failed to list bundles for expiry: {e}");
                return 0;
            }
        };

        let mut count = 0;
        for bundle in bundles.into_iter().filter(|b| b.is_expired()) {
            match self
                .store
                .update_status(&bundle.id(), BundleStatus::Expired)
                .await
            {
                Ok(()) => {
                    debug!("{bundle} expired");
                    self.counters.expired();
                    count += 1;
                }
                Err(storage::Error::TerminalStatus { from, .. }) => {
                    trace!("Retiring {bundle}, already {from}");
                }
                Err(e) => {
                    error!("Failed to expire {bundle}: {e}");
                    continue;
                }
            }

            if let Err(e) = self.store.delete(&bundle.id()).await {
                error!("Failed to delete expired {bundle}: {e}");
            }
        }

        if count > 0 {
            info!("Expired {count} bundles");
        }
        count
    }

    fn check_neighbors(&self) {
        let cutoff = time::OffsetDateTime::now_utc() - self.config.neighbor_timeout;
        for id in self.neighbors.deactivate_stale(cutoff) {
            info!("Neighbor {id} silent for over {}, marked inactive", self.config.neighbor_timeout);
        }
    }

    /// Re-queues pending bundles, highest priority first, while there is room.
    async fn redrive_pending(&self) {
        let filter = storage::Filter {
            limit: Some(self.egress_tx.capacity().unwrap_or(usize::MAX)),
            ..storage::Filter::with_status(BundleStatus::Pending)
        };
        let pending = match self.store.list(&filter).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Failed to list pending bundles: {e}");
                return;
            }
        };

        let mut queued = 0;
        for bundle in &pending {
            if !self.enqueue_egress(bundle.id()) {
                break;
            }
            queued += 1;
        }
        if queued > 0 {
            debug!("Re-driving {queued} of {} pending bundles", pending.len());
        }
    }
}
