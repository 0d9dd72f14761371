//! Discrete-event DTN simulation.
//!
//! Builds a [`world::World`] from a validated [`scenario::ScenarioConfig`],
//! feeds it connectivity changes and external events, and collects run
//! statistics through the listener interface.

pub mod events;
pub mod scenario;
pub mod stats;
pub mod world;

pub use events::{EventError, EventQueue, ExternalEvent, MessageEvent, ScheduledUpdatesQueue};
pub use scenario::{GroupSpec, ScenarioConfig, ScenarioError};
pub use stats::SimStats;
pub use world::World;
