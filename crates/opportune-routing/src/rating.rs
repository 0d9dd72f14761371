//! Time-windowed rating mechanism.
//!
//! Several estimators (encounter value, replications density) share the same
//! update discipline: raw observations accumulate during a fixed-length time
//! window, and the exposed rating changes only when a full window has
//! elapsed, never mid-window. Each completed window commits independently
//! of prior ones.

use crate::error::ConfigError;

/// Window bookkeeping for an interval-updating rating mechanism.
///
/// The concrete estimator holds the committed value and the in-progress
/// accumulator; this type only decides *when* a commit is due.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingWindow {
    window_length: f64,
    next_window_end: f64,
}

impl RatingWindow {
    /// Create a window of `window_length` seconds.
    ///
    /// A window length of zero (or less) is a configuration error.
    pub fn new(mechanism: &'static str, window_length: f64) -> Result<Self, ConfigError> {
        if window_length <= 0.0 {
            return Err(ConfigError::NonPositiveWindow { mechanism, value: window_length });
        }
        Ok(Self { window_length, next_window_end: window_length })
    }

    pub fn window_length(&self) -> f64 {
        self.window_length
    }

    /// Advance to `now`, calling `commit` once per completed window.
    ///
    /// Call this on every simulation step; between commits the estimator's
    /// exposed value stays at its last committed state.
    pub fn advance(&mut self, now: f64, mut commit: impl FnMut()) {
        while now >= self.next_window_end {
            commit();
            self.next_window_end += self.window_length;
        }
    }
}
