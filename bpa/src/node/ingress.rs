use super::*;

impl Node {
    pub(super) async fn run_ingress(self: Arc<Self>) {
        let cancel_token = self.tasks.cancel_token().clone();
        loop {
            tokio::select! {
                bundle = self.ingress_rx.recv_async() => {
                    let Ok(bundle) = bundle else {
                        break;
                    };
                    self.ingress_bundle(bundle).await;
                },
                _ = cancel_token.cancelled() => break,
            }
        }
        debug!("Ingress worker stopped");
    }

    #[cfg_attr(feature = "instrument", instrument(skip_all, fields(bundle = %bundle.id())))]
    async fn ingress_bundle(&self, bundle: bundle::Bundle) {
        self.counters.received();

        if let Err(e) = bundle
            .validate()
            .and_then(|_| bundle.check_hop_limit(self.config.max_hop_count))
        {
            warn!("Dropping {bundle}: {e}");
            self.counters.dropped();
            return;
        }

        let stored = match self.store.store(&bundle).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to store {bundle}: {e}");
                self.counters.dropped();
                return;
            }
        };

        if !stored {
            match self.store.status(&bundle.id()).await {
                Ok(status) if status.is_terminal() => {
                    debug!("Dropping duplicate of {bundle}, already {status}");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read status of {bundle}: {e}");
                    return;
                }
            }
        }

        if bundle.destination() == self.endpoint {
            if self.set_status(&bundle, BundleStatus::Delivered).await {
                self.counters.delivered();
                self.delivery.deliver(bundle).await;
            }
            return;
        }

        // A copy we forwarded earlier has come back round
        if !stored {
            if !self.adopt_transit(&bundle).await {
                return;
            }
            if !self.set_status(&bundle, BundleStatus::Pending).await {
                return;
            }
        }

        if self.enqueue_egress(bundle.id()) {
            trace!("Queued {bundle} for egress");
        } else {
            warn!("Egress queue full, {bundle} stays pending");
        }
    }

    /// Keeps whichever copy has travelled further, so hops are never undone.
    async fn adopt_transit(&self, bundle: &bundle::Bundle) -> bool {
        let held = match self.store.retrieve(&bundle.id()).await {
            Ok(held) => held,
            Err(e) => {
                error!("Failed to retrieve held copy of {bundle}: {e}");
                return false;
            }
        };
        if bundle.hop_count() <= held.hop_count() {
            return true;
        }

        debug!(
            "{bundle} returned after {} hops, held copy had {}",
            bundle.hop_count(),
            held.hop_count()
        );
        self.store
            .replace(bundle)
            .await
            .inspect_err(|e| error!("Failed to update {bundle}: {e}"))
            .is_ok()
    }
}
