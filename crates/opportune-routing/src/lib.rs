//! Routing engine for opportunistic networks.
//!
//! Hosts carry messages through a store-and-forward buffer and decide at
//! every contact what to relay, replicate or evict. The engine is split
//! into drop policies (what to evict under capacity pressure), windowed
//! estimators (delivery predictability, encounter value, replications
//! density, meeting probabilities) and the routing protocols that combine
//! them. [`router::ActiveRouter`] is the per-host entry point; the
//! simulation crate drives it.

pub mod cost;
pub mod density;
pub mod drop_policy;
pub mod encounter;
pub mod error;
pub mod policy;
pub mod predictability;
pub mod rating;
pub mod router;

pub use drop_policy::{DropPolicy, DropPolicyKind};
pub use error::ConfigError;
pub use policy::{RouterConfig, RouterKind, RouterPolicy, RoutingSummary};
pub use router::{ActiveRouter, Admission, PeerView, Reception, SendPlan};
