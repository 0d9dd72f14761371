//! Encounter value: a windowed measure of a host's popularity.
//!
//! Counts contacts per time window and ages the committed value with an
//! exponentially weighted moving average, so a host that has been meeting
//! many peers recently scores high and a host that went quiet decays.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, check_unit_range};
use crate::rating::RatingWindow;

/// Ratio value when both compared hosts are equally social.
const EQUALLY_SOCIAL: f64 = 0.5;
/// Values below this count as "no encounters at all".
const ZERO_ENCOUNTERS: f64 = 1e-6;

/// Encounter value configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncounterConfig {
    /// Weight of the most recent window relative to history, in [0, 1].
    pub aging_factor: f64,
    /// Window length in seconds; must be positive.
    pub window_length: f64,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self { aging_factor: 0.85, window_length: 21600.0 }
    }
}

/// Tracks a single host's encounter value.
#[derive(Debug, Clone)]
pub struct EncounterValueManager {
    aging_factor: f64,
    window: RatingWindow,
    encounter_value: f64,
    current_window_counter: u32,
}

impl EncounterValueManager {
    pub fn new(config: EncounterConfig) -> Result<Self, ConfigError> {
        check_unit_range("encounter value aging factor", config.aging_factor)?;
        Ok(Self {
            aging_factor: config.aging_factor,
            window: RatingWindow::new("encounter value", config.window_length)?,
            encounter_value: 0.0,
            current_window_counter: 0,
        })
    }

    /// Record a contact for the in-progress window.
    pub fn add_encounter(&mut self) {
        self.current_window_counter += 1;
    }

    /// The last committed encounter value; 0 before the first full window.
    pub fn encounter_value(&self) -> f64 {
        self.encounter_value
    }

    /// Commit completed windows up to `now`.
    pub fn update(&mut self, now: f64) {
        let aging = self.aging_factor;
        let counter = &mut self.current_window_counter;
        let value = &mut self.encounter_value;
        self.window.advance(now, || {
            *value = aging * f64::from(*counter) + (1.0 - aging) * *value;
            *counter = 0;
        });
    }

    /// Ratio between another host's encounter value and this one's.
    ///
    /// Above 0.5 means the other host is the more social one; exactly 0.5
    /// when both are (near) zero.
    pub fn encounter_ratio(&self, other_encounter_value: f64) -> f64 {
        if self.encounter_value < ZERO_ENCOUNTERS && other_encounter_value < ZERO_ENCOUNTERS {
            return EQUALLY_SOCIAL;
        }
        other_encounter_value / (self.encounter_value + other_encounter_value)
    }
}
