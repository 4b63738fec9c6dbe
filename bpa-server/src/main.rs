mod config;

use satnet_bpa::{node::Node, routing, storage};
use std::sync::Arc;
use trace_err::*;
use tracing::{info, warn};

fn init_logger(log_level: &str) -> anyhow::Result<()> {
    let log_level = log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|e| anyhow::anyhow!("Invalid 'log_level' value '{log_level}': {e}"))?;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(
            log_level > tracing_subscriber::filter::LevelFilter::from_level(tracing::Level::INFO),
        )
        .init();
    Ok(())
}

#[cfg(feature = "sqlite-storage")]
fn default_storage(upgrade: bool) -> Arc<dyn storage::BundleStorage> {
    info!("Using default sqlite bundle storage");
    satnet_sqlite_storage::new(&Default::default(), upgrade)
}

#[cfg(not(feature = "sqlite-storage"))]
fn default_storage(_upgrade: bool) -> Arc<dyn storage::BundleStorage> {
    info!("Using default in-memory bundle storage");
    storage::bundle_mem::new(&Default::default())
}

fn init_storage(
    config: Option<config::Storage>,
    upgrade: bool,
) -> Arc<dyn storage::BundleStorage> {
    match config {
        None => default_storage(upgrade),
        Some(config::Storage::Memory(config)) => {
            info!("Using in-memory bundle storage");
            storage::bundle_mem::new(&config.unwrap_or_default())
        }
        #[cfg(feature = "sqlite-storage")]
        Some(config::Storage::Sqlite(config)) => {
            info!("Using sqlite bundle storage");
            satnet_sqlite_storage::new(&config.unwrap_or_default(), upgrade)
        }
    }
}

fn init_router(config: config::Router) -> anyhow::Result<Arc<dyn routing::Router>> {
    let router: Arc<dyn routing::Router> = match config {
        config::Router::Energy(config) => {
            let config = config.unwrap_or_default();
            info!(
                "Using energy-aware routing, quality weight {} energy weight {}",
                config.quality_weight, config.energy_weight
            );
            Arc::new(routing::energy::EnergyAwareRouter::new(config)?)
        }
        config::Router::Static(routes) => {
            info!("Using static routing with {} routes", routes.len());
            Arc::new(routing::static_routes::StaticRouter::with_routes(
                routes.into_iter().map(|r| (r.destination, r.next_hop)),
            ))
        }
    };
    Ok(router)
}

fn report_statistics(node: Arc<Node>, interval: u64, tasks: &satnet_async::TaskPool) {
    if interval == 0 {
        return;
    }

    let cancel_token = tasks.cancel_token().clone();
    tasks.spawn_named("statistics", async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = node.statistics();
                    info!(
                        neighbors = stats.neighbor_count,
                        ingress = stats.ingress_queue_depth,
                        egress = stats.egress_queue_depth,
                        received = stats.received,
                        sent = stats.sent,
                        delivered = stats.delivered,
                        dropped = stats.dropped,
                        expired = stats.expired,
                        "Node {} statistics", stats.node_id
                    );
                }
                _ = cancel_token.cancelled() => break,
            }
        }
    });
}

async fn wait_for_shutdown() {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            let mut term_handler =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .trace_expect("Failed to register signal handlers");
            let term = term_handler.recv();
        } else {
            let term = std::future::pending::<Option<()>>();
        }
    }

    tokio::select! {
        _ = term => info!("Received terminate signal, stopping..."),
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r {
                warn!("Failed to listen for CTRL+C: {e}");
            }
            info!("Received CTRL+C, stopping...");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some((config, config_source)) = config::init()? else {
        return Ok(());
    };

    init_logger(&config.log_level)?;
    info!(
        "{} version {} starting...",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    info!("{config_source}");

    let store = init_storage(config.storage, config.upgrade_storage);
    let router = init_router(config.router)?;

    let node = Node::builder(&config.node_id, &config.endpoint)
        .config(config.node)
        .store(store)
        .router(router)
        .build();

    for neighbor in &config.neighbors {
        node.add_neighbor(neighbor.into());
    }
    node.start();

    let tasks = satnet_async::TaskPool::new();
    report_statistics(node.clone(), config.statistics_interval, &tasks);

    info!("Started successfully");
    wait_for_shutdown().await;

    tasks.shutdown().await;
    node.stop().await;

    info!("Stopped");
    Ok(())
}
