//! The per-host router: buffer management and transfer planning shared by
//! all protocol variants.
//!
//! A router owns its host's message buffer, a drop policy and a
//! [`RouterPolicy`]. The scheduler drives it through a small surface:
//! contact hooks, a periodic update (TTL sweep plus estimator ticks),
//! message admission for both locally created and received messages, and
//! send planning over the currently idle contacts. The router never touches
//! connections or listeners itself; it reports what happened and the
//! scheduler turns that into transfers and notifications.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use opportune_core::MessageBuffer;
use opportune_core::group::GroupRegistry;
use opportune_core::message::{HostId, Message, Priority};

use crate::drop_policy::{DropPolicy, DropPolicyKind};
use crate::error::ConfigError;
use crate::policy::{RouterConfig, RouterPolicy, RoutingSummary};

/// Prefix of generated response message ids.
const RESPONSE_ID_PREFIX: &str = "r_";

/// What a host shares about itself at contact time.
#[derive(Debug, Clone)]
pub struct PeerView {
    pub host: HostId,
    pub carried: BTreeSet<String>,
    pub free_capacity: u64,
    pub total_capacity: u64,
    /// Whether the host's drop policy ever evicts to make room.
    pub evicts: bool,
    pub summary: RoutingSummary,
}

impl PeerView {
    /// Whether a message of `size` could land in this host's buffer,
    /// directly or after eviction.
    pub fn can_accommodate(&self, size: u64) -> bool {
        size <= self.free_capacity || (self.evicts && size <= self.total_capacity)
    }
}

/// Outcome of admitting a message into the local buffer.
#[derive(Debug)]
pub enum Admission {
    /// The message is buffered; `evicted` lists what had to go first.
    Stored { evicted: Vec<Message> },
    /// The buffer cannot accommodate the message even after eviction.
    Rejected(Message),
}

/// Outcome of receiving a message over a connection.
#[derive(Debug, Default)]
pub struct Reception {
    /// This receipt completed delivery to a final recipient.
    pub delivered: bool,
    /// The message is buffered for further relaying.
    pub stored: bool,
    /// Messages evicted to make room.
    pub evicted: Vec<Message>,
    /// The message itself, when the buffer refused it.
    pub rejected: Option<Message>,
    /// A response message the recipient wants sent back to the source.
    pub response: Option<Message>,
}

/// A send decision: which message to put on the wire towards which peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub peer: HostId,
    pub message_id: String,
}

/// One host's router.
pub struct ActiveRouter {
    host: HostId,
    buffer: MessageBuffer,
    drop_policy: Box<dyn DropPolicy>,
    policy: RouterPolicy,
    /// Ids this host already accepted as a final recipient; duplicates of
    /// these are ignored on arrival.
    delivered: BTreeSet<String>,
}

impl ActiveRouter {
    pub fn new(
        host: HostId,
        buffer_capacity: u64,
        drop_policy: DropPolicyKind,
        config: &RouterConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            host,
            buffer: MessageBuffer::new(buffer_capacity),
            drop_policy: drop_policy.build(),
            policy: config.build(host)?,
            delivered: BTreeSet::new(),
        })
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub fn policy(&self) -> &RouterPolicy {
        &self.policy
    }

    /// Ids this host holds: the buffer contents plus already-delivered
    /// messages, which it "holds" for eligibility purposes so peers stop
    /// offering them.
    fn carried(&self) -> BTreeSet<String> {
        self.buffer.ids().map(str::to_string).chain(self.delivered.iter().cloned()).collect()
    }

    /// Snapshot handed to the other side of a fresh contact.
    pub fn peer_view(&self, now: f64) -> PeerView {
        PeerView {
            host: self.host,
            carried: self.carried(),
            free_capacity: self.buffer.free(),
            total_capacity: self.buffer.capacity(),
            evicts: self.drop_policy.evicts(),
            summary: self.policy.summary(now),
        }
    }

    /// Digest a new contact with the host summarized by `peer`.
    ///
    /// Returns messages purged because the peer knows they were already
    /// delivered elsewhere.
    pub fn on_connection_up(&mut self, peer: &PeerView, now: f64) -> Vec<Message> {
        let own_carried = self.carried();
        let purgeable =
            self.policy.on_contact(peer.host, &peer.summary, &peer.carried, &own_carried, now);
        let mut purged = Vec::with_capacity(purgeable.len());
        for id in purgeable {
            if let Some(message) = self.buffer.remove(&id) {
                self.policy.on_message_removed(&id);
                debug!(host = self.host.0, message = %id, "purging acknowledged message");
                purged.push(message);
            }
        }
        purged
    }

    /// A contact ended. Transfer aborts are handled by the scheduler.
    pub fn on_connection_down(&mut self, _peer: HostId, _now: f64) {}

    /// Periodic tick: advance estimators and purge expired messages.
    ///
    /// Returns the expired messages for deletion notifications.
    pub fn update(&mut self, now: f64) -> Vec<Message> {
        let expired = self.buffer.take_expired(now);
        for message in &expired {
            self.policy.on_message_removed(message.id());
            debug!(host = self.host.0, message = message.id(), "message expired");
        }
        self.policy.update(now);
        expired
    }

    /// Admit a locally originated message.
    pub fn create_message(&mut self, message: Message, now: f64) -> Admission {
        self.admit(message, now)
    }

    /// Receive a message that finished transferring over a connection.
    pub fn receive(&mut self, mut message: Message, groups: &GroupRegistry, now: f64) -> Reception {
        if self.delivered.contains(message.id()) || self.buffer.contains(message.id()) {
            trace!(host = self.host.0, message = message.id(), "duplicate receipt ignored");
            return Reception::default();
        }
        message.record_hop(self.host);

        if message.completes_delivery(self.host) {
            self.delivered.insert(message.id().to_string());
            self.policy.on_delivered(message.id());
            let response = self.build_response(&message, now);
            return Reception { delivered: true, response, ..Reception::default() };
        }

        let delivered = message.is_final_recipient(self.host, groups);
        if delivered {
            // broadcast/multicast: accept the copy and keep relaying it
            self.delivered.insert(message.id().to_string());
        }
        match self.admit(message, now) {
            Admission::Stored { evicted } => {
                Reception { delivered, stored: true, evicted, ..Reception::default() }
            }
            Admission::Rejected(message) => {
                Reception { delivered, rejected: Some(message), ..Reception::default() }
            }
        }
    }

    /// Pick the best message/peer pair among the idle contacts, if any.
    ///
    /// Candidates are ordered by message priority first, protocol utility
    /// second; delivery straight to a final recipient outranks any relay.
    /// Remaining ties fall back to buffer arrival order, then peer order.
    pub fn plan_send(
        &self,
        peers: &[PeerView],
        groups: &GroupRegistry,
        now: f64,
    ) -> Option<SendPlan> {
        let mut best: Option<(Priority, f64, SendPlan)> = None;
        for message in self.buffer.iter() {
            for peer in peers {
                if peer.carried.contains(message.id()) {
                    continue;
                }
                if !peer.can_accommodate(message.size()) {
                    continue;
                }
                let is_final = message.is_final_recipient(peer.host, groups);
                if !is_final && !self.policy.should_forward(message, &peer.summary, groups, now) {
                    continue;
                }
                let utility = if is_final {
                    f64::INFINITY
                } else {
                    self.policy.utility(message, &peer.summary, groups, now)
                };
                let better = match &best {
                    None => true,
                    Some((priority, best_utility, _)) => {
                        match message.priority().cmp(priority) {
                            std::cmp::Ordering::Greater => true,
                            std::cmp::Ordering::Less => false,
                            std::cmp::Ordering::Equal => utility > *best_utility,
                        }
                    }
                };
                if better {
                    best = Some((
                        message.priority(),
                        utility,
                        SendPlan { peer: peer.host, message_id: message.id().to_string() },
                    ));
                }
            }
        }
        best.map(|(_, _, plan)| plan)
    }

    /// A transfer of `message_id` out of this host finished.
    ///
    /// The local copy stays buffered; protocols that purge delivered
    /// copies do so through their acknowledgement exchange, not here.
    pub fn on_transfer_completed(&mut self, message_id: &str, delivered: bool) {
        if let Some(message) = self.buffer.get_mut(message_id) {
            message.record_forward();
        }
        if delivered {
            self.policy.on_delivered(message_id);
        }
    }

    fn build_response(&self, request: &Message, now: f64) -> Option<Message> {
        if request.response_size() == 0 || request.is_response() {
            return None;
        }
        Some(
            Message::new(
                format!("{RESPONSE_ID_PREFIX}{}", request.id()),
                self.host,
                opportune_core::message::Recipients::Unicast(request.from()),
                request.response_size(),
                now,
            )
            .as_response_to(request.id()),
        )
    }

    fn admit(&mut self, message: Message, now: f64) -> Admission {
        if self.buffer.contains(message.id()) {
            debug!(host = self.host.0, message = message.id(), "duplicate id, rejecting");
            return Admission::Rejected(message);
        }
        if message.size() > self.buffer.capacity() {
            debug!(host = self.host.0, message = message.id(), "message exceeds total capacity");
            return Admission::Rejected(message);
        }
        let required = message.size().saturating_sub(self.buffer.free());
        let Some(victims) = self.drop_policy.select_victims(&self.buffer, required, now) else {
            debug!(
                host = self.host.0,
                message = message.id(),
                policy = self.drop_policy.name(),
                "buffer overflow unresolved, rejecting"
            );
            return Admission::Rejected(message);
        };
        let mut evicted = Vec::with_capacity(victims.len());
        for id in victims {
            if let Some(victim) = self.buffer.remove(&id) {
                self.policy.on_message_removed(&id);
                evicted.push(victim);
            }
        }
        let id = message.id().to_string();
        // duplicate id and capacity were both checked above
        if self.buffer.insert(message).is_ok() {
            self.policy.on_message_added(&id);
        }
        Admission::Stored { evicted }
    }
}
