use super::*;
use neighbors::Neighbor;
use std::sync::RwLock;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Maximum communication range, in kilometres.
    pub max_range_km: f64,
    /// Battery level under which a satellite counts as low.
    pub low_battery_percent: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_range_km: 5000.0,
            low_battery_percent: 20.0,
        }
    }
}

/// Cartesian coordinates in kilometres, or a velocity in km/s.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vector) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

/// Last known kinematic and power state of a tracked node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Satellite {
    pub id: String,
    pub endpoint: String,
    pub position: Vector,
    pub velocity: Vector,
    pub battery_percent: f64,
    pub in_eclipse: bool,
    /// Set by [`TopologyManager::update_satellite`].
    #[cfg_attr(feature = "serde", serde(skip, default = "time::OffsetDateTime::now_utc"))]
    pub updated_at: time::OffsetDateTime,
}

impl Satellite {
    pub fn new(id: &str, endpoint: &str, position: Vector) -> Self {
        Self {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            position,
            velocity: Vector::default(),
            battery_percent: 100.0,
            in_eclipse: false,
            updated_at: time::OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatistics {
    pub total: usize,
    pub low_battery_count: usize,
    pub eclipse_count: usize,
}

/// Tracks where every known node is and whether it has power.
///
/// Reachability here is geometry only: two nodes see each other when they
/// are within range. Energy is left to the router.
pub struct TopologyManager {
    config: Config,
    satellites: RwLock<hashbrown::HashMap<String, Satellite>>,
}

impl TopologyManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            satellites: RwLock::new(hashbrown::HashMap::new()),
        }
    }

    /// Inserts or replaces by id, stamping the update time.
    pub fn update_satellite(&self, mut satellite: Satellite) {
        satellite.updated_at = time::OffsetDateTime::now_utc();
        trace!(
            "Satellite {} at ({:.1}, {:.1}, {:.1}), battery {:.0}%",
            satellite.id,
            satellite.position.x,
            satellite.position.y,
            satellite.position.z,
            satellite.battery_percent
        );
        self.satellites
            .write()
            .trace_expect("Failed to lock topology")
            .insert(satellite.id.clone(), satellite);
    }

    pub fn remove_satellite(&self, id: &str) -> Option<Satellite> {
        self.satellites
            .write()
            .trace_expect("Failed to lock topology")
            .remove(id)
    }

    pub fn satellite(&self, id: &str) -> Option<Satellite> {
        self.satellites
            .read()
            .trace_expect("Failed to lock topology")
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.satellites
            .read()
            .trace_expect("Failed to lock topology")
            .contains_key(id)
    }

    /// Drops satellites not heard from within `max_age`, returning their ids.
    pub fn prune_stale(&self, max_age: time::Duration) -> Vec<String> {
        let cutoff = time::OffsetDateTime::now_utc() - max_age;
        let mut satellites = self.satellites.write().trace_expect("Failed to lock topology");
        let stale = satellites
            .values()
            .filter(|s| s.updated_at < cutoff)
            .map(|s| s.id.clone())
            .collect::<Vec<_>>();
        for id in &stale {
            debug!("Pruning stale satellite {id}");
            satellites.remove(id);
        }
        stale
    }

    /// Linear extrapolation from the last known velocity.
    pub fn predict_position(&self, satellite: &Satellite, dt: time::Duration) -> Vector {
        let secs = dt.as_seconds_f64();
        Vector::new(
            satellite.position.x + satellite.velocity.x * secs,
            satellite.position.y + satellite.velocity.y * secs,
            satellite.position.z + satellite.velocity.z * secs,
        )
    }

    fn within_range<F>(&self, id: &str, position: F) -> Vec<(Satellite, f64)>
    where
        F: Fn(&Satellite) -> Vector,
    {
        let satellites = self.satellites.read().trace_expect("Failed to lock topology");
        let Some(origin) = satellites.get(id) else {
            return Vec::new();
        };
        let origin = position(origin);

        let mut visible = satellites
            .values()
            .filter(|s| s.id != id)
            .filter_map(|s| {
                let d = origin.distance(&position(s));
                (d <= self.config.max_range_km).then(|| (s.clone(), d))
            })
            .collect::<Vec<_>>();
        visible.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        visible
    }

    /// Every other tracked satellite within range of `id` right now, by id.
    ///
    /// Unknown ids see nothing.
    pub fn visible_neighbors(&self, id: &str) -> Vec<Satellite> {
        self.within_range(id, |s| s.position)
            .into_iter()
            .map(|(s, _)| s)
            .collect()
    }

    /// Satellites expected to be within range of `id` after `dt`.
    pub fn predicted_neighbors(&self, id: &str, dt: time::Duration) -> Vec<Satellite> {
        self.within_range(id, |s| self.predict_position(s, dt))
            .into_iter()
            .map(|(s, _)| s)
            .collect()
    }

    /// The visible set as neighbor entries a node can load into its table.
    ///
    /// Link quality falls off linearly with distance, `1 - d / range`.
    pub fn neighbor_links(&self, id: &str) -> Vec<Neighbor> {
        self.within_range(id, |s| s.position)
            .into_iter()
            .map(|(s, d)| {
                let quality = if self.config.max_range_km > 0.0 {
                    1.0 - d / self.config.max_range_km
                } else {
                    0.0
                };
                let mut neighbor =
                    Neighbor::new(&s.id, &s.endpoint, quality).with_battery(s.battery_percent);
                neighbor.last_contact = s.updated_at;
                neighbor
            })
            .collect()
    }

    pub fn network_statistics(&self) -> NetworkStatistics {
        let satellites = self.satellites.read().trace_expect("Failed to lock topology");
        NetworkStatistics {
            total: satellites.len(),
            low_battery_count: satellites
                .values()
                .filter(|s| s.battery_percent < self.config.low_battery_percent)
                .count(),
            eclipse_count: satellites.values().filter(|s| s.in_eclipse).count(),
        }
    }
}

impl Default for TopologyManager {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
