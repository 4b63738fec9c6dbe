use super::*;

impl Node {
    pub(super) async fn run_egress(self: Arc<Self>) {
        let cancel_token = self.tasks.cancel_token().clone();
        loop {
            tokio::select! {
                id = self.egress_rx.recv_async() => {
                    let Ok(id) = id else {
                        break;
                    };
                    self.egress_bundle(id).await;
                },
                _ = cancel_token.cancelled() => break,
            }
        }
        debug!("Egress worker stopped");
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    async fn egress_bundle(&self, id: bundle::Id) {
        // The queue may hold stale or repeated entries: only pending copies go
        match self.store.status(&id).await {
            Ok(BundleStatus::Pending) => {}
            Ok(status) => {
                trace!("Skipping bundle {id}, it is {status}");
                return;
            }
            Err(storage::Error::NotFound(_)) => {
                trace!("Skipping bundle {id}, no longer stored");
                return;
            }
            Err(e) => {
                error!("Failed to read status of bundle {id}: {e}");
                return;
            }
        }

        let mut bundle = match self.store.retrieve(&id).await {
            Ok(bundle) => bundle,
            Err(e) => {
                error!("Failed to retrieve bundle {id}: {e}");
                return;
            }
        };

        if bundle.is_expired() {
            trace!("Not forwarding expired {bundle}");
            return;
        }

        let neighbors = self.neighbors.snapshot();
        let next_hop = match self.router.select_next_hop(&bundle, &neighbors) {
            Ok(next_hop) => next_hop,
            Err(e) => {
                debug!("{bundle} stays pending: {e}");
                return;
            }
        };
        let Some(next_hop) = neighbors.into_iter().find(|n| n.id == next_hop) else {
            error!("Router selected unknown neighbor {next_hop} for {bundle}");
            return;
        };

        bundle.increment_hop(&self.id);
        if let Err(e) = bundle.check_hop_limit(self.config.max_hop_count) {
            warn!("Dropping {bundle}: {e}");
            if self.set_status(&bundle, BundleStatus::Failed).await {
                self.counters.dropped();
            }
            return;
        }

        // Persist the hop so a copy routed back here resumes from it
        if let Err(e) = self.store.replace(&bundle).await {
            error!("Failed to update {bundle}: {e}");
            return;
        }

        if !self.set_status(&bundle, BundleStatus::InTransit).await {
            return;
        }

        debug!("Forwarding {bundle} to {}", next_hop.id);
        match self.transmitter.transmit(&next_hop, bundle.clone()).await {
            Ok(()) => self.counters.sent(),
            Err(e) => {
                warn!("Failed to transmit {bundle} to {}: {e}", next_hop.id);
                if self.set_status(&bundle, BundleStatus::Failed).await {
                    self.counters.dropped();
                }
            }
        }
    }
}
