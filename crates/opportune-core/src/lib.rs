//! # Opportune Core
//!
//! Core types for simulating opportunistic (delay-tolerant) networks.
//!
//! In an opportunistic network, mobile nodes exchange messages only during
//! transient contact windows, using store-and-forward routing instead of
//! end-to-end paths. This crate provides the leaf building blocks the
//! routing engine and the simulation world are built from:
//!
//! - [`clock`]: simulated time, resettable between runs
//! - [`message`]: unicast, broadcast, multicast and data-carrying messages
//!   with replication semantics
//! - [`group`]: multicast group registry with explicit lifecycle
//! - [`buffer`]: bounded per-host message store
//! - [`connection`]: per-node-pair contact state machine with a constant
//!   bit-rate transfer model
//! - [`event`]: listener fan-out for message and connection lifecycle
//! - [`error`]: core error types

pub mod buffer;
pub mod clock;
pub mod connection;
pub mod error;
pub mod event;
pub mod group;
pub mod message;

pub use buffer::MessageBuffer;
pub use clock::SimClock;
pub use connection::{Connection, Transfer};
pub use error::CoreError;
pub use event::{EventLog, ListenerRegistry, NetworkEvent, NetworkListener};
pub use group::{Group, GroupAddress, GroupRegistry};
pub use message::{DataClass, HostId, Message, Priority, Recipients};
