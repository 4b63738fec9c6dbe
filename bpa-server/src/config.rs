use super::*;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", content = "config")]
pub enum Storage {
    #[serde(rename = "memory")]
    Memory(Option<satnet_bpa::storage::bundle_mem::Config>),

    #[cfg(feature = "sqlite-storage")]
    #[serde(rename = "sqlite")]
    Sqlite(Option<satnet_sqlite_storage::Config>),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Route {
    pub destination: String,
    pub next_hop: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", content = "config")]
pub enum Router {
    #[serde(rename = "energy")]
    Energy(Option<satnet_bpa::routing::energy::Config>),

    #[serde(rename = "static")]
    Static(Vec<Route>),
}

impl Default for Router {
    fn default() -> Self {
        Self::Energy(None)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    pub endpoint: String,
    #[serde(default = "Neighbor::default_link_quality")]
    pub link_quality: f64,
    #[serde(default)]
    pub battery_percent: Option<f64>,
}

impl Neighbor {
    fn default_link_quality() -> f64 {
        1.0
    }
}

impl From<&Neighbor> for satnet_bpa::neighbors::Neighbor {
    fn from(n: &Neighbor) -> Self {
        let neighbor = satnet_bpa::neighbors::Neighbor::new(&n.id, &n.endpoint, n.link_quality);
        match n.battery_percent {
            Some(battery) => neighbor.with_battery(battery),
            None => neighbor,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    pub log_level: String,

    /// Identity of this node: its neighbor id and endpoint
    pub node_id: String,
    pub endpoint: String,

    #[serde(flatten)]
    pub node: satnet_bpa::config::Config,

    pub storage: Option<Storage>,

    pub router: Router,

    /// Links known at startup
    pub neighbors: Vec<Neighbor>,

    /// Seconds between statistics reports, 0 to disable
    pub statistics_interval: u64,

    #[serde(skip)]
    pub upgrade_storage: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            node_id: "node".to_string(),
            endpoint: "dtn://node/".to_string(),
            node: Default::default(),
            storage: None,
            router: Router::default(),
            neighbors: Vec::new(),
            statistics_interval: 60,
            upgrade_storage: false,
        }
    }
}

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optflag("h", "help", "print this help menu")
        .optflag("v", "version", "print the version information")
        .optflag(
            "u",
            "upgrade-store",
            "upgrade the bundle store to the current schema",
        )
        .optopt("c", "config", "use a custom configuration file", "FILE");
    opts
}

pub fn config_dir() -> PathBuf {
    directories::ProjectDirs::from("dtn", "Satnet", env!("CARGO_PKG_NAME")).map_or_else(
        || {
            cfg_if::cfg_if! {
                if #[cfg(unix)] {
                    std::path::Path::new("/etc/opt").join(env!("CARGO_PKG_NAME"))
                } else if #[cfg(windows)] {
                    std::env::temp_dir().join(env!("CARGO_PKG_NAME"))
                } else {
                    compile_error!("No idea how to determine default config directory for target platform")
                }
            }
        },
        |proj_dirs| proj_dirs.config_local_dir().to_path_buf(),
    )
}

/// Parses the command line and loads configuration.
///
/// Returns `None` when the command line only asked for help or the version.
pub fn init() -> anyhow::Result<Option<(Config, String)>> {
    let opts = options();
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_default();
    let flags = opts
        .parse(args.iter().skip(1))
        .context("Failed to parse command line args")?;

    if flags.opt_present("h") {
        let brief = format!(
            "{} {} - {}\n\nUsage: {} [options]",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_DESCRIPTION"),
            program
        );
        print!("{}", opts.usage(&brief));
        return Ok(None);
    }
    if flags.opt_present("v") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(None);
    }

    let mut b = ::config::Config::builder();

    let config_source: String;
    if let Some(source) = flags.opt_str("config") {
        config_source = format!("Using configuration file '{source}' specified on command line");
        b = b.add_source(::config::File::with_name(&source))
    } else if let Ok(source) = std::env::var("SATNET_BPA_SERVER_CONFIG_FILE") {
        config_source = format!(
            "Using configuration file '{source}' specified by SATNET_BPA_SERVER_CONFIG_FILE environment variable"
        );
        b = b.add_source(::config::File::with_name(&source))
    } else {
        let path = config_dir().join(format!("{}.yaml", env!("CARGO_PKG_NAME")));
        config_source = format!("Using optional configuration file '{}'", path.display());
        b = b.add_source(::config::File::from(path).required(false))
    }

    b = b.add_source(::config::Environment::with_prefix("SATNET_BPA_SERVER"));

    let mut config: Config = b
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    config.upgrade_storage = flags.opt_present("u");

    Ok(Some((config, config_source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "log_level": "debug",
            "node_id": "sat001",
            "endpoint": "dtn://mars/sat001",
            "egress_queue_depth": 64,
            "sweep_interval": 30,
            "storage": { "type": "memory", "config": { "max-bundles": 500 } },
            "router": { "type": "static", "config": [
                { "destination": "dtn://earth/", "next_hop": "relay" }
            ] },
            "neighbors": [
                { "id": "relay", "endpoint": "dtn://relay/", "link_quality": 0.8 },
                { "id": "sat002", "endpoint": "dtn://mars/sat002", "battery_percent": 15.0 }
            ]
        }))
        .unwrap();

        assert_eq!(config.node_id, "sat001");
        assert_eq!(config.node.egress_queue_depth.get(), 64);
        assert_eq!(config.node.sweep_interval, time::Duration::seconds(30));
        assert_eq!(config.node.ingress_queue_depth.get(), 1000);
        assert!(matches!(
            config.storage,
            Some(Storage::Memory(Some(ref c))) if c.max_bundles.get() == 500
        ));
        assert!(matches!(config.router, Router::Static(ref r) if r.len() == 1));

        let n: satnet_bpa::neighbors::Neighbor = (&config.neighbors[1]).into();
        assert_eq!(n.link_quality, 1.0);
        assert_eq!(n.battery_percent, Some(15.0));
    }

    #[test]
    fn defaults_are_usable() {
        let config: Config = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.log_level, "info");
        assert!(matches!(config.router, Router::Energy(None)));
        assert!(config.neighbors.is_empty());
        assert_eq!(config.statistics_interval, 60);
    }
}
