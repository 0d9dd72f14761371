//! Simulated time.
//!
//! The clock is explicit process-scoped state with an init/reset lifecycle,
//! injected into everything that needs the current simulation time. It is
//! shared via `Rc<SimClock>` rather than ambient global state so that
//! sequential simulation runs (and tests) stay isolated.

use std::cell::Cell;

/// Monotonically advancing simulated time in seconds.
///
/// The engine is single-threaded, so interior mutability via [`Cell`] is
/// sufficient; there are no concurrent readers or writers.
#[derive(Debug, Default)]
pub struct SimClock {
    time: Cell<f64>,
}

impl SimClock {
    /// Create a new clock at time 0.
    pub fn new() -> Self {
        Self { time: Cell::new(0.0) }
    }

    /// Current simulation time in seconds since start.
    pub fn now(&self) -> f64 {
        self.time.get()
    }

    /// Advance the clock by `dt` seconds.
    pub fn advance(&self, dt: f64) {
        debug_assert!(dt >= 0.0, "clock cannot run backwards");
        self.time.set(self.time.get() + dt);
    }

    /// Jump the clock to an absolute time.
    ///
    /// Used by the scheduler when honoring one-shot scheduled updates.
    pub fn set(&self, time: f64) {
        debug_assert!(time >= self.time.get(), "clock cannot run backwards");
        self.time.set(time);
    }

    /// Reset the clock to 0 for a fresh simulation run.
    pub fn reset(&self) {
        self.time.set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let clock = SimClock::new();
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn test_advance_accumulates() {
        let clock = SimClock::new();
        clock.advance(0.1);
        clock.advance(0.9);
        assert!((clock.now() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reset_between_runs() {
        let clock = SimClock::new();
        clock.advance(100.0);
        clock.reset();
        assert_eq!(clock.now(), 0.0);
    }
}
