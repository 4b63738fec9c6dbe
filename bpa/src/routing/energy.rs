use super::*;

/// Energy score given to neighbors that look about to lose power.
pub const LOW_ENERGY_SCORE: f64 = 0.3;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub quality_weight: f64,
    pub energy_weight: f64,
    /// Link quality below which a neighbor with no battery reading is
    /// assumed to be low on energy.
    pub low_quality_threshold: f64,
    /// Battery level under which a neighbor scores as low on energy.
    pub low_battery_percent: f64,
    /// Battery a neighbor must report to carry bulk traffic at all.
    pub min_battery_bulk: f64,
    pub min_battery_normal: f64,
    pub min_battery_expedited: f64,
    /// Hand a bundle straight to an active neighbor that is its destination.
    pub prefer_destination: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality_weight: 0.7,
            energy_weight: 0.3,
            low_quality_threshold: 0.3,
            low_battery_percent: 20.0,
            min_battery_bulk: 30.0,
            min_battery_normal: 20.0,
            min_battery_expedited: 10.0,
            prefer_destination: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.quality_weight < 0.0
            || self.energy_weight < 0.0
            || ((self.quality_weight + self.energy_weight) - 1.0).abs() > 1e-9
        {
            return Err(Error::InvalidWeights {
                quality: self.quality_weight,
                energy: self.energy_weight,
            });
        }
        if !(0.0..=1.0).contains(&self.low_quality_threshold) {
            return Err(Error::InvalidThreshold(self.low_quality_threshold));
        }
        for percent in [
            self.low_battery_percent,
            self.min_battery_bulk,
            self.min_battery_normal,
            self.min_battery_expedited,
        ] {
            if !(0.0..=100.0).contains(&percent) {
                return Err(Error::InvalidThreshold(percent));
            }
        }
        Ok(())
    }

    /// Battery floor for carrying a bundle of `priority`: more urgent
    /// traffic may drain a neighbor further.
    pub fn min_battery(&self, priority: bundle::Priority) -> f64 {
        match priority {
            bundle::Priority::Bulk => self.min_battery_bulk,
            bundle::Priority::Normal => self.min_battery_normal,
            bundle::Priority::Expedited => self.min_battery_expedited,
        }
    }
}

/// Ranks active neighbors by weighted link quality and energy state.
#[derive(Debug, Clone)]
pub struct EnergyAwareRouter {
    config: Config,
}

impl EnergyAwareRouter {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn energy_score(&self, neighbor: &Neighbor) -> f64 {
        let low = match neighbor.battery_percent {
            Some(battery) => battery < self.config.low_battery_percent,
            None => neighbor.link_quality < self.config.low_quality_threshold,
        };
        if low { LOW_ENERGY_SCORE } else { 1.0 }
    }

    /// Active, and not too drained for the bundle's priority. A neighbor with
    /// no battery reading is assumed to have enough.
    pub fn is_eligible(&self, bundle: &bundle::Bundle, neighbor: &Neighbor) -> bool {
        neighbor.active
            && neighbor
                .battery_percent
                .is_none_or(|battery| battery >= self.config.min_battery(bundle.priority()))
    }

    pub fn score(&self, neighbor: &Neighbor) -> f64 {
        self.config.quality_weight * neighbor.link_quality
            + self.config.energy_weight * self.energy_score(neighbor)
    }
}

impl Router for EnergyAwareRouter {
    fn select_next_hop(&self, bundle: &bundle::Bundle, neighbors: &[Neighbor]) -> Result<String> {
        let mut active = neighbors.iter().filter(|n| self.is_eligible(bundle, n));

        if self.config.prefer_destination
            && let Some(direct) = active.clone().find(|n| n.endpoint == bundle.destination())
        {
            trace!("{bundle} is one hop from its destination {}", direct.id);
            return Ok(direct.id.clone());
        }

        // Strictly greater, so the first seen wins a tie
        let first = active.next().ok_or_else(|| no_route(bundle))?;
        let mut best = (first, self.score(first));
        for n in active {
            let score = self.score(n);
            if score > best.1 {
                best = (n, score);
            }
        }

        trace!("Selected {} for {bundle} with score {:.3}", best.0.id, best.1);
        Ok(best.0.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> EnergyAwareRouter {
        EnergyAwareRouter::new(Config::default()).unwrap()
    }

    fn bundle() -> bundle::Bundle {
        bundle::Bundle::create("dtn://a/", "dtn://z/", "x")
    }

    #[test]
    fn prefers_energy_healthy_neighbor() {
        let urgent = bundle::Bundle::builder("dtn://a/", "dtn://z/")
            .priority(bundle::Priority::Expedited)
            .build();
        let neighbors = [
            Neighbor::new("drained", "dtn://drained/", 0.8).with_battery(15.0),
            Neighbor::new("healthy", "dtn://healthy/", 0.8).with_battery(80.0),
        ];
        assert_eq!(router().energy_score(&neighbors[0]), LOW_ENERGY_SCORE);
        assert_eq!(router().select_next_hop(&urgent, &neighbors).unwrap(), "healthy");
    }

    #[test]
    fn battery_floor_depends_on_priority() {
        let r = router();
        let drained = [Neighbor::new("drained", "dtn://drained/", 0.9).with_battery(15.0)];
        let with_priority = |priority| {
            bundle::Bundle::builder("dtn://a/", "dtn://z/")
                .priority(priority)
                .build()
        };

        assert_eq!(
            r.select_next_hop(&with_priority(bundle::Priority::Expedited), &drained)
                .unwrap(),
            "drained"
        );
        assert_eq!(
            r.select_next_hop(&with_priority(bundle::Priority::Normal), &drained),
            Err(Error::NoRoute("dtn://z/".into()))
        );
        assert_eq!(
            r.select_next_hop(&with_priority(bundle::Priority::Bulk), &drained),
            Err(Error::NoRoute("dtn://z/".into()))
        );

        // At exactly the floor is enough
        let edge = [Neighbor::new("edge", "dtn://edge/", 0.9).with_battery(30.0)];
        assert_eq!(
            r.select_next_hop(&with_priority(bundle::Priority::Bulk), &edge)
                .unwrap(),
            "edge"
        );
    }

    #[test]
    fn drained_destination_is_not_preferred() {
        let bulk = bundle::Bundle::builder("dtn://a/", "dtn://z/")
            .priority(bundle::Priority::Bulk)
            .build();
        let neighbors = [
            Neighbor::new("relay", "dtn://relay/", 0.5),
            Neighbor::new("z", "dtn://z/", 1.0).with_battery(25.0),
        ];
        assert_eq!(router().select_next_hop(&bulk, &neighbors).unwrap(), "relay");
    }

    #[test]
    fn poor_link_is_low_energy_proxy() {
        let r = router();
        let weak = Neighbor::new("weak", "dtn://weak/", 0.28);
        let fair = Neighbor::new("fair", "dtn://fair/", 0.31);
        assert_eq!(r.energy_score(&weak), LOW_ENERGY_SCORE);
        assert_eq!(r.energy_score(&fair), 1.0);
        assert_eq!(r.select_next_hop(&bundle(), &[weak, fair]).unwrap(), "fair");
    }

    #[test]
    fn ties_go_to_first_seen() {
        let neighbors = [
            Neighbor::new("first", "dtn://first/", 0.6),
            Neighbor::new("second", "dtn://second/", 0.6),
        ];
        assert_eq!(router().select_next_hop(&bundle(), &neighbors).unwrap(), "first");
    }

    #[test]
    fn inactive_neighbors_are_ignored() {
        let mut best = Neighbor::new("best", "dtn://best/", 1.0);
        best.active = false;
        let neighbors = [best.clone(), Neighbor::new("ok", "dtn://ok/", 0.2)];
        assert_eq!(router().select_next_hop(&bundle(), &neighbors).unwrap(), "ok");
        assert_eq!(
            router().select_next_hop(&bundle(), &[best]),
            Err(Error::NoRoute("dtn://z/".into()))
        );
    }

    #[test]
    fn destination_wins_outright() {
        let neighbors = [
            Neighbor::new("relay", "dtn://relay/", 1.0),
            Neighbor::new("z", "dtn://z/", 0.1),
        ];
        assert_eq!(router().select_next_hop(&bundle(), &neighbors).unwrap(), "z");

        let r = EnergyAwareRouter::new(Config {
            prefer_destination: false,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(r.select_next_hop(&bundle(), &neighbors).unwrap(), "relay");
    }

    #[test]
    fn bad_weights_are_rejected() {
        assert!(matches!(
            EnergyAwareRouter::new(Config {
                quality_weight: 0.9,
                energy_weight: 0.3,
                ..Default::default()
            }),
            Err(Error::InvalidWeights { .. })
        ));
        assert!(matches!(
            EnergyAwareRouter::new(Config {
                low_quality_threshold: 1.5,
                ..Default::default()
            }),
            Err(Error::InvalidThreshold(_))
        ));
        assert!(matches!(
            EnergyAwareRouter::new(Config {
                min_battery_bulk: 120.0,
                ..Default::default()
            }),
            Err(Error::InvalidThreshold(_))
        ));
    }
}
