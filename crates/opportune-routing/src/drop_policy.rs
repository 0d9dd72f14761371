//! Buffer eviction strategies.
//!
//! A drop policy is consulted exactly when an incoming message (received or
//! newly created) would exceed the remaining buffer capacity. It selects
//! victims until enough space is freed, or refuses the incoming message when
//! no selection can help. Within a policy, equally ranked messages are
//! evicted in arrival order (stable sort over the buffer's arrival order).
//!
//! Victims are selected strictly in policy order until the freed space
//! suffices, even when that frees more than the minimum required; no
//! subset-sum optimization is attempted.

use serde::{Deserialize, Serialize};

use opportune_core::MessageBuffer;
use opportune_core::message::Message;

/// A pluggable buffer-eviction strategy.
pub trait DropPolicy {
    fn name(&self) -> &'static str;

    /// Whether this policy ever evicts buffered messages.
    ///
    /// Peers use this to judge if a message larger than the receiver's free
    /// space could still be accommodated after eviction.
    fn evicts(&self) -> bool {
        true
    }

    /// Select victims freeing at least `required` bytes, in eviction order.
    ///
    /// Returns `None` if the policy cannot (or will not) free enough space;
    /// the incoming message is then rejected.
    fn select_victims(&self, buffer: &MessageBuffer, required: u64, now: f64) -> Option<Vec<String>>;
}

/// Walk messages in the given order, taking victims until `required` bytes
/// are freed.
fn take_until_freed(ordered: &[&Message], required: u64) -> Option<Vec<String>> {
    let mut freed = 0u64;
    let mut victims = Vec::new();
    for message in ordered {
        if freed >= required {
            break;
        }
        victims.push(message.id().to_string());
        freed += message.size();
    }
    if freed >= required { Some(victims) } else { None }
}

/// FIFO: evict the oldest messages (by creation time) first.
#[derive(Debug, Default)]
pub struct Fifo;

impl DropPolicy for Fifo {
    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn select_victims(&self, buffer: &MessageBuffer, required: u64, _now: f64) -> Option<Vec<String>> {
        let mut ordered: Vec<&Message> = buffer.iter().collect();
        ordered.sort_by(|a, b| a.creation_time().total_cmp(&b.creation_time()));
        take_until_freed(&ordered, required)
    }
}

/// MOFO: evict the most forwarded messages first.
///
/// Penalizes messages that are already well replicated in the network.
#[derive(Debug, Default)]
pub struct Mofo;

impl DropPolicy for Mofo {
    fn name(&self) -> &'static str {
        "MOFO"
    }

    fn select_victims(&self, buffer: &MessageBuffer, required: u64, _now: f64) -> Option<Vec<String>> {
        let mut ordered: Vec<&Message> = buffer.iter().collect();
        ordered.sort_by(|a, b| b.forward_count().cmp(&a.forward_count()));
        take_until_freed(&ordered, required)
    }
}

/// SHLI: evict the messages with the shortest remaining life first.
///
/// Keeps the messages likeliest to still be deliverable.
#[derive(Debug, Default)]
pub struct Shli;

impl DropPolicy for Shli {
    fn name(&self) -> &'static str {
        "SHLI"
    }

    fn select_victims(&self, buffer: &MessageBuffer, required: u64, now: f64) -> Option<Vec<String>> {
        let mut ordered: Vec<&Message> = buffer.iter().collect();
        ordered.sort_by(|a, b| a.remaining_ttl(now).total_cmp(&b.remaining_ttl(now)));
        take_until_freed(&ordered, required)
    }
}

/// Passive: never evict; an incoming message that does not fit is rejected.
#[derive(Debug, Default)]
pub struct Passive;

impl DropPolicy for Passive {
    fn name(&self) -> &'static str {
        "passive"
    }

    fn evicts(&self) -> bool {
        false
    }

    fn select_victims(&self, _buffer: &MessageBuffer, required: u64, _now: f64) -> Option<Vec<String>> {
        if required == 0 { Some(Vec::new()) } else { None }
    }
}

/// Drop-policy selector for the configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DropPolicyKind {
    #[default]
    Fifo,
    Mofo,
    Shli,
    Passive,
}

impl DropPolicyKind {
    /// Build the policy this selector names.
    pub fn build(&self) -> Box<dyn DropPolicy> {
        match self {
            DropPolicyKind::Fifo => Box::new(Fifo),
            DropPolicyKind::Mofo => Box::new(Mofo),
            DropPolicyKind::Shli => Box::new(Shli),
            DropPolicyKind::Passive => Box::new(Passive),
        }
    }
}
