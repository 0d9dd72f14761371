//! Delivery predictabilities, the estimator behind encounter-probability
//! routing.
//!
//! Every host keeps one probability per known destination. A direct meeting
//! raises the probability towards 1, hearing about a destination through a
//! met peer raises it transitively, and plain passage of time decays it.
//! Aging is applied lazily: a value is brought up to date whenever it is
//! read or written, never on a timer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use opportune_core::message::HostId;

use crate::error::{ConfigError, check_positive, check_unit_range};

/// Delivery predictability parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictabilityConfig {
    /// Growth increment applied on a direct encounter, in [0, 1].
    pub beta: f64,
    /// Per-time-unit decay factor, in [0, 1].
    pub gamma: f64,
    /// Weight of transitively learned predictabilities, in [0, 1].
    pub transitivity_scaling: f64,
    /// Seconds per aging time unit; must be positive.
    pub time_unit: f64,
}

impl Default for PredictabilityConfig {
    fn default() -> Self {
        Self { beta: 0.75, gamma: 0.98, transitivity_scaling: 0.25, time_unit: 60.0 }
    }
}

impl PredictabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_range("delivery predictability beta", self.beta)?;
        check_unit_range("delivery predictability gamma", self.gamma)?;
        check_unit_range("delivery predictability transitivity scaling", self.transitivity_scaling)?;
        check_positive("delivery predictability time unit", self.time_unit)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: f64,
    last_update: f64,
}

/// One host's table of delivery predictabilities.
#[derive(Debug, Clone)]
pub struct DeliveryPredictabilityStore {
    owner: HostId,
    config: PredictabilityConfig,
    entries: BTreeMap<HostId, Entry>,
}

impl DeliveryPredictabilityStore {
    pub fn new(owner: HostId, config: PredictabilityConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { owner, config, entries: BTreeMap::new() })
    }

    pub fn owner(&self) -> HostId {
        self.owner
    }

    fn aged(&self, entry: Entry, now: f64) -> f64 {
        let elapsed = now - entry.last_update;
        if elapsed <= 0.0 {
            return entry.value;
        }
        entry.value * self.config.gamma.powf(elapsed / self.config.time_unit)
    }

    /// The predictability towards `destination`, aged to `now`.
    ///
    /// Unknown destinations report 0.
    pub fn predictability(&self, destination: HostId, now: f64) -> f64 {
        match self.entries.get(&destination) {
            Some(entry) => self.aged(*entry, now),
            None => 0.0,
        }
    }

    /// Snapshot of the whole table, aged to `now`, for handing to a peer.
    pub fn snapshot(&self, now: f64) -> BTreeMap<HostId, f64> {
        self.entries.iter().map(|(dest, entry)| (*dest, self.aged(*entry, now))).collect()
    }

    /// Record a direct meeting with `encountered`.
    pub fn record_encounter(&mut self, encountered: HostId, now: f64) {
        let old = self.predictability(encountered, now);
        let new = old + (1.0 - old) * self.config.beta;
        self.entries.insert(encountered, Entry { value: new, last_update: now });
    }

    /// Fold a met peer's table into this one.
    ///
    /// Call after `record_encounter` for the same peer, so the direct
    /// predictability towards it is current.
    pub fn record_transitive(&mut self, peer: HostId, peer_table: &BTreeMap<HostId, f64>, now: f64) {
        let towards_peer = self.predictability(peer, now);
        for (&destination, &peer_value) in peer_table {
            if destination == self.owner || destination == peer {
                continue;
            }
            let old = self.predictability(destination, now);
            let new = (old + towards_peer * peer_value * self.config.transitivity_scaling).min(1.0);
            self.entries.insert(destination, Entry { value: new, last_update: now });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn make_store(owner: u32) -> DeliveryPredictabilityStore {
        DeliveryPredictabilityStore::new(HostId(owner), PredictabilityConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad_beta = PredictabilityConfig { beta: 1.2, ..PredictabilityConfig::default() };
        assert!(bad_beta.validate().is_err());
        let bad_unit = PredictabilityConfig { time_unit: 0.0, ..PredictabilityConfig::default() };
        assert!(bad_unit.validate().is_err());
    }

    #[test]
    fn test_unknown_destination_is_zero() {
        let store = make_store(0);
        assert_eq!(store.predictability(HostId(7), 100.0), 0.0);
    }

    #[test]
    fn test_single_encounter_matches_growth_formula() {
        let mut store = make_store(0);
        store.record_encounter(HostId(1), 0.0);
        // 0 + (1 - 0) * beta
        assert!((store.predictability(HostId(1), 0.0) - 0.75).abs() < EPSILON);
    }

    #[test]
    fn test_encounters_never_decrease_and_approach_one() {
        let mut store = make_store(0);
        let mut previous = 0.0;
        for _ in 0..20 {
            store.record_encounter(HostId(1), 0.0);
            let current = store.predictability(HostId(1), 0.0);
            assert!(current > previous);
            assert!(current < 1.0);
            previous = current;
        }
        assert!(previous > 0.999);
    }

    #[test]
    fn test_time_passage_decays_value() {
        let mut store = make_store(0);
        store.record_encounter(HostId(1), 0.0);
        let fresh = store.predictability(HostId(1), 0.0);
        let aged = store.predictability(HostId(1), 120.0);
        // two time units of gamma decay
        assert!((aged - fresh * 0.98f64.powi(2)).abs() < EPSILON);
        assert!(aged < fresh);
    }

    #[test]
    fn test_reading_does_not_mutate() {
        let mut store = make_store(0);
        store.record_encounter(HostId(1), 0.0);
        let first = store.predictability(HostId(1), 60.0);
        let second = store.predictability(HostId(1), 60.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_transitive_update_matches_formula() {
        let mut store = make_store(0);
        store.record_encounter(HostId(1), 0.0);
        let towards_peer = store.predictability(HostId(1), 0.0);

        let mut peer_table = BTreeMap::new();
        peer_table.insert(HostId(2), 0.6);
        store.record_transitive(HostId(1), &peer_table, 0.0);

        let expected = towards_peer * 0.6 * 0.25;
        assert!((store.predictability(HostId(2), 0.0) - expected).abs() < EPSILON);
    }

    #[test]
    fn test_transitive_update_skips_self_and_peer() {
        let mut store = make_store(0);
        store.record_encounter(HostId(1), 0.0);
        let direct = store.predictability(HostId(1), 0.0);

        let mut peer_table = BTreeMap::new();
        peer_table.insert(HostId(0), 0.9);
        peer_table.insert(HostId(1), 0.9);
        store.record_transitive(HostId(1), &peer_table, 0.0);

        assert_eq!(store.predictability(HostId(0), 0.0), 0.0);
        assert_eq!(store.predictability(HostId(1), 0.0), direct);
    }

    #[test]
    fn test_transitive_update_clamped_at_one() {
        let config = PredictabilityConfig {
            beta: 1.0,
            transitivity_scaling: 1.0,
            ..PredictabilityConfig::default()
        };
        let mut store = DeliveryPredictabilityStore::new(HostId(0), config).unwrap();
        store.record_encounter(HostId(1), 0.0);
        store.record_encounter(HostId(2), 0.0);

        let mut peer_table = BTreeMap::new();
        peer_table.insert(HostId(2), 1.0);
        store.record_transitive(HostId(1), &peer_table, 0.0);

        assert_eq!(store.predictability(HostId(2), 0.0), 1.0);
    }
}
