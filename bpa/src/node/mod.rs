use super::*;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use metadata::BundleStatus;
use neighbors::{Neighbor, NeighborTable};
use thiserror::Error;

mod egress;
mod ingress;
mod reaper;


pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Ingress,
    Egress,
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Queue::Ingress => f.write_str("ingress"),
            Queue::Egress => f.write_str("egress"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("The {0} queue is full")]
    Capacity(Queue),

    #[error(transparent)]
    Invalid(#[from] bundle::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error("Node is not running")]
    NotRunning,
}

#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Created = 0,
    Started = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl From<usize> for State {
    fn from(value: usize) -> Self {
        match value {
            0 => State::Created,
            1 => State::Started,
            2 => State::Running,
            3 => State::Stopping,
            _ => State::Stopped,
        }
    }
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    expired: AtomicU64,
    delivered: AtomicU64,
}

impl Counters {
    fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bundles_received").increment(1);
    }

    fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bundles_sent").increment(1);
    }

    fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bundles_dropped").increment(1);
    }

    fn expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bundles_expired").increment(1);
    }

    fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bundles_delivered").increment(1);
    }
}

/// A point-in-time view of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub node_id: String,
    pub endpoint: String,
    pub neighbor_count: usize,
    pub ingress_queue_depth: usize,
    pub egress_queue_depth: usize,
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub expired: u64,
    pub delivered: u64,
}

/// Assembles a [`Node`]. Anything not supplied gets a working default: an
/// in-memory store, the energy-aware router, a discarding transmitter and a
/// logging local consumer.
pub struct Builder {
    id: String,
    endpoint: String,
    config: config::Config,
    store: Option<Arc<dyn storage::BundleStorage>>,
    router: Option<Arc<dyn routing::Router>>,
    transmitter: Option<Arc<dyn cla::Transmitter>>,
    delivery: Option<Arc<dyn service::Delivery>>,
}

impl Builder {
    pub fn config(mut self, config: config::Config) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn storage::BundleStorage>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn router(mut self, router: Arc<dyn routing::Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn transmitter(mut self, transmitter: Arc<dyn cla::Transmitter>) -> Self {
        self.transmitter = Some(transmitter);
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn service::Delivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn build(self) -> Arc<Node> {
        let ingress = flume::bounded(self.config.ingress_queue_depth.get());
        let egress = flume::bounded(self.config.egress_queue_depth.get());

        Arc::new(Node {
            store: self
                .store
                .unwrap_or_else(|| storage::bundle_mem::new(&Default::default())),
            router: self.router.unwrap_or_else(|| {
                Arc::new(
                    routing::energy::EnergyAwareRouter::new(Default::default())
                        .trace_expect("Default router configuration is invalid"),
                )
            }),
            transmitter: self
                .transmitter
                .unwrap_or_else(|| Arc::new(cla::NullTransmitter)),
            delivery: self
                .delivery
                .unwrap_or_else(|| Arc::new(service::LogDelivery)),
            id: self.id,
            endpoint: self.endpoint,
            config: self.config,
            state: AtomicUsize::new(State::Created as usize),
            tasks: satnet_async::TaskPool::new(),
            neighbors: NeighborTable::default(),
            redrive: satnet_async::Notify::new(),
            counters: Counters::default(),
            ingress_tx: ingress.0,
            ingress_rx: ingress.1,
            egress_tx: egress.0,
            egress_rx: egress.1,
        })
    }
}

/// A store-and-forward node.
///
/// The node is the only writer of custody status in its store. Three workers
/// run once started: ingress handles arrivals, egress routes stored bundles
/// to a next hop, and the reaper expires bundles, ages out silent neighbors
/// and re-drives pending bundles.
pub struct Node {
    id: String,
    endpoint: String,
    config: config::Config,
    store: Arc<dyn storage::BundleStorage>,
    router: Arc<dyn routing::Router>,
    transmitter: Arc<dyn cla::Transmitter>,
    delivery: Arc<dyn service::Delivery>,
    state: AtomicUsize,
    tasks: satnet_async::TaskPool,
    neighbors: NeighborTable,
    redrive: satnet_async::Notify,
    counters: Counters,
    ingress_tx: flume::Sender<bundle::Bundle>,
    ingress_rx: flume::Receiver<bundle::Bundle>,
    egress_tx: flume::Sender<bundle::Id>,
    egress_rx: flume::Receiver<bundle::Id>,
}

impl Node {
    pub fn builder(id: &str, endpoint: &str) -> Builder {
        Builder {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            config: config::Config::default(),
            store: None,
            router: None,
            transmitter: None,
            delivery: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> State {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn store(&self) -> &Arc<dyn storage::BundleStorage> {
        &self.store
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.state
            .compare_exchange(from as usize, to as usize, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    fn accepting(&self) -> Result<()> {
        if self.state() >= State::Stopping {
            Err(Error::NotRunning)
        } else {
            Ok(())
        }
    }

    /// Launches the ingress, egress and reaper workers and returns at once.
    ///
    /// A node starts at most once.
    #[cfg_attr(feature = "instrument", instrument(skip(self), fields(node = %self.id)))]
    pub fn start(self: &Arc<Self>) {
        if !self.transition(State::Created, State::Started) {
            warn!("Node {} already started, ignoring start request", self.id);
            return;
        }

        let node = self.clone();
        self.tasks
            .spawn_named("ingress", async move { node.run_ingress().await });

        let node = self.clone();
        self.tasks
            .spawn_named("egress", async move { node.run_egress().await });

        let node = self.clone();
        self.tasks
            .spawn_named("reaper", async move { node.run_reaper().await });

        self.state
            .store(State::Running as usize, Ordering::Release);
        info!("Node {} running as {}", self.id, self.endpoint);
    }

    /// Stops every worker and waits for them.
    ///
    /// Anything still queued is discarded. Stored bundles are untouched.
    #[cfg_attr(feature = "instrument", instrument(skip(self), fields(node = %self.id)))]
    pub async fn stop(&self) {
        let stopping = self.transition(State::Running, State::Stopping)
            || self.transition(State::Started, State::Stopping)
            || self.transition(State::Created, State::Stopping);
        if !stopping {
            debug!("Node {} is already stopping", self.id);
            return;
        }

        self.tasks.shutdown().await;

        let discarded = self.ingress_rx.drain().count() + self.egress_rx.drain().count();
        if discarded > 0 {
            info!("Node {} discarded {discarded} queued entries", self.id);
        }

        self.state
            .store(State::Stopped as usize, Ordering::Release);
        info!("Node {} stopped", self.id);
    }

    /// Stores a locally originated bundle and queues it for forwarding.
    ///
    /// The source is stamped with this node's endpoint. Never waits for queue
    /// space: a full egress queue fails with [`Error::Capacity`] and the copy
    /// just stored is removed again.
    #[cfg_attr(feature = "instrument", instrument(skip_all, fields(bundle = %bundle.id())))]
    pub async fn send_bundle(&self, mut bundle: bundle::Bundle) -> Result<()> {
        self.accepting()?;

        bundle.stamp_source(&self.endpoint);
        bundle.validate()?;
        bundle.check_hop_limit(self.config.max_hop_count)?;

        let stored = self.store.store(&bundle).await?;
        match self.egress_tx.try_send(bundle.id()) {
            Ok(()) => {
                debug!("Queued {bundle} for egress");
                Ok(())
            }
            Err(flume::TrySendError::Full(_)) => {
                if stored {
                    self.store.delete(&bundle.id()).await?;
                }
                Err(Error::Capacity(Queue::Egress))
            }
            Err(flume::TrySendError::Disconnected(_)) => Err(Error::NotRunning),
        }
    }

    /// Hands an arriving bundle to the ingress worker without waiting.
    pub fn receive_bundle(&self, bundle: bundle::Bundle) -> Result<()> {
        self.accepting()?;

        self.ingress_tx.try_send(bundle).map_err(|e| match e {
            flume::TrySendError::Full(_) => Error::Capacity(Queue::Ingress),
            flume::TrySendError::Disconnected(_) => Error::NotRunning,
        })
    }

    /// Builds a bundle from this node with the configured default lifetime.
    pub fn create_bundle(
        &self,
        destination: &str,
        payload: impl Into<Bytes>,
        priority: bundle::Priority,
    ) -> bundle::Bundle {
        bundle::Bundle::builder(&self.endpoint, destination)
            .lifetime(self.config.default_lifetime)
            .priority(priority)
            .payload(payload)
            .build()
    }

    /// Adds or replaces a neighbor, re-driving pending bundles if it helps.
    pub fn add_neighbor(&self, neighbor: Neighbor) {
        debug!(
            "Neighbor {} at {} with link quality {:.2}",
            neighbor.id, neighbor.endpoint, neighbor.link_quality
        );
        if self.neighbors.upsert(neighbor) {
            self.redrive.notify_one();
        }
    }

    pub fn remove_neighbor(&self, id: &str) -> Option<Neighbor> {
        let removed = self.neighbors.remove(id);
        if removed.is_some() {
            debug!("Neighbor {id} removed");
        }
        removed
    }

    /// Records a fresh link quality reading. Returns `false` for an unknown neighbor.
    pub fn update_neighbor_quality(&self, id: &str, link_quality: f64) -> bool {
        match self.neighbors.update_quality(id, link_quality) {
            Some(improved) => {
                if improved {
                    self.redrive.notify_one();
                }
                true
            }
            None => {
                debug!("Quality update for unknown neighbor {id}");
                false
            }
        }
    }

    /// Refreshes the neighbor table from the topology view of this node.
    ///
    /// Visible satellites are upserted. Known satellites that have dropped
    /// out of range are marked inactive; neighbors the topology does not
    /// track are left alone. Returns the number of visible neighbors.
    pub fn apply_topology(&self, topology: &topology::TopologyManager) -> usize {
        let links = topology.neighbor_links(&self.id);
        let visible = links.len();

        let mut improved = false;
        for mut stale in self.neighbors.snapshot() {
            if stale.active
                && topology.contains(&stale.id)
                && !links.iter().any(|l| l.id == stale.id)
            {
                debug!("Neighbor {} is out of range", stale.id);
                stale.active = false;
                self.neighbors.upsert(stale);
            }
        }
        for link in links {
            improved |= self.neighbors.upsert(link);
        }

        if improved {
            self.redrive.notify_one();
        }
        visible
    }

    /// A snapshot of the neighbor table in first-seen order.
    pub fn neighbors(&self) -> Vec<Neighbor> {
        self.neighbors.snapshot()
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            node_id: self.id.clone(),
            endpoint: self.endpoint.clone(),
            neighbor_count: self.neighbors.len(),
            ingress_queue_depth: self.ingress_tx.len(),
            egress_queue_depth: self.egress_tx.len(),
            received: self.counters.received.load(Ordering::Relaxed),
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
        }
    }

    /// Queues `id` for egress, reporting whether there was room.
    fn enqueue_egress(&self, id: bundle::Id) -> bool {
        self.egress_tx.try_send(id).is_ok()
    }

    async fn set_status(&self, bundle: &bundle::Bundle, status: BundleStatus) -> bool {
        self.store
            .update_status(&bundle.id(), status)
            .await
            .inspect_err(|e| error!("Failed to mark {bundle} {status}: {e}"))
            .is_ok()
    }
}
