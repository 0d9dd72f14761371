//! Replications density: how widely a buffered message is already spread.
//!
//! For every message in the host's buffer, tracks the fraction of hosts met
//! during a time window that also carried the message. Routers use it to
//! stop replicating data that is already saturated nearby.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use opportune_core::message::HostId;

use crate::error::ConfigError;
use crate::rating::RatingWindow;

/// Density reported while nothing is known yet about a message.
const UNKNOWN_REPLICATIONS_DENSITY: f64 = 0.5;

/// Replications density configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityConfig {
    /// Window length in seconds; must be positive.
    pub window_length: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self { window_length: 21600.0 }
    }
}

/// Tracks replications densities for one host's buffered messages.
#[derive(Debug, Clone)]
pub struct ReplicationsDensityManager {
    window: RatingWindow,
    /// Committed densities, keyed by message id.
    densities: BTreeMap<String, f64>,
    /// Which hosts carried which message during the in-progress window.
    ///
    /// Counting raw sightings would be wrong twice over: a host met twice
    /// must not count its messages twice, and a host's buffer may change
    /// between meetings, so sightings cannot be restricted to first
    /// contacts either.
    encountered_messages: BTreeMap<String, BTreeSet<HostId>>,
    /// Every host met during the in-progress window.
    unique_encounters: BTreeSet<HostId>,
}

impl ReplicationsDensityManager {
    pub fn new(config: DensityConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            window: RatingWindow::new("replications density", config.window_length)?,
            densities: BTreeMap::new(),
            encountered_messages: BTreeMap::new(),
            unique_encounters: BTreeSet::new(),
        })
    }

    /// Record a contact and the ids the encountered host carries.
    pub fn add_encounter<'a>(&mut self, host: HostId, carried: impl Iterator<Item = &'a str>) {
        self.unique_encounters.insert(host);
        for id in carried {
            // Only ids we hold ourselves will ever be queried.
            if self.densities.contains_key(id) {
                self.encountered_messages.entry(id.to_string()).or_default().insert(host);
            }
        }
    }

    /// The replications density of a buffered message.
    ///
    /// # Panics
    ///
    /// Panics when asked about a message that was never registered; routers
    /// only query densities for messages in their own buffer, so an unknown
    /// id is a programming error.
    pub fn density(&self, message_id: &str) -> f64 {
        match self.densities.get(message_id) {
            Some(density) => *density,
            None => panic!("replications density queried for unknown message {message_id}"),
        }
    }

    /// Commit completed windows up to `now`.
    pub fn update(&mut self, now: f64) {
        let densities = &mut self.densities;
        let encountered = &mut self.encountered_messages;
        let unique = &mut self.unique_encounters;
        self.window.advance(now, || {
            // An isolated window keeps all old values.
            if unique.is_empty() {
                return;
            }
            let met = unique.len() as f64;
            for (id, density) in densities.iter_mut() {
                if let Some(hosts) = encountered.get(id) {
                    *density = hosts.len() as f64 / met;
                }
            }
            unique.clear();
            for hosts in encountered.values_mut() {
                hosts.clear();
            }
        });
    }

    /// Register a message that entered the host's buffer.
    pub fn add_message(&mut self, message_id: &str) {
        self.densities.entry(message_id.to_string()).or_insert(UNKNOWN_REPLICATIONS_DENSITY);
    }

    /// Forget a message that left the host's buffer.
    pub fn remove_message(&mut self, message_id: &str) {
        self.densities.remove(message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_manager() -> ReplicationsDensityManager {
        ReplicationsDensityManager::new(DensityConfig { window_length: 10.0 }).unwrap()
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(ReplicationsDensityManager::new(DensityConfig { window_length: 0.0 }).is_err());
    }

    #[test]
    fn test_unknown_until_first_window() {
        let mut manager = make_manager();
        manager.add_message("M1");
        manager.add_encounter(HostId(1), ["M1"].into_iter());
        manager.update(9.0);
        assert_eq!(manager.density("M1"), UNKNOWN_REPLICATIONS_DENSITY);
    }

    #[test]
    fn test_density_is_carrier_fraction() {
        let mut manager = make_manager();
        manager.add_message("M1");
        manager.add_encounter(HostId(1), ["M1"].into_iter());
        manager.add_encounter(HostId(2), [].into_iter());
        manager.add_encounter(HostId(3), [].into_iter());
        manager.add_encounter(HostId(4), ["M1"].into_iter());

        manager.update(10.0);
        assert_eq!(manager.density("M1"), 0.5);
    }

    #[test]
    fn test_repeated_meetings_count_once() {
        let mut manager = make_manager();
        manager.add_message("M1");
        manager.add_encounter(HostId(1), ["M1"].into_iter());
        manager.add_encounter(HostId(1), ["M1"].into_iter());
        manager.add_encounter(HostId(2), [].into_iter());

        manager.update(10.0);
        assert_eq!(manager.density("M1"), 0.5);
    }

    #[test]
    fn test_isolated_window_keeps_old_values() {
        let mut manager = make_manager();
        manager.add_message("M1");
        manager.add_encounter(HostId(1), ["M1"].into_iter());
        manager.update(10.0);
        assert_eq!(manager.density("M1"), 1.0);

        // nobody met in the second window
        manager.update(20.0);
        assert_eq!(manager.density("M1"), 1.0);
    }

    #[test]
    fn test_removed_message_is_forgotten() {
        let mut manager = make_manager();
        manager.add_message("M1");
        manager.remove_message("M1");
        // re-adding starts from the unknown default again
        manager.add_message("M1");
        assert_eq!(manager.density("M1"), UNKNOWN_REPLICATIONS_DENSITY);
    }

    #[test]
    #[should_panic(expected = "unknown message")]
    fn test_unregistered_query_panics() {
        let manager = make_manager();
        manager.density("nope");
    }
}
