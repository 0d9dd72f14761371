//! Message model.
//!
//! A message is created at a node and passed between nodes during contacts.
//! Four kinds of recipients exist: a single host (unicast), every host
//! (broadcast), a group of hosts (multicast), and a data-carrying message
//! addressed to a single host. The recipient kind decides what "delivered"
//! means: unicast and data messages complete delivery exactly at their
//! destination, while broadcast and multicast messages never complete (there
//! is no unique final event) but treat every eligible host as a final
//! recipient.

use serde::{Deserialize, Serialize};

use crate::group::{GroupAddress, GroupRegistry};

/// Address of a host in the simulated network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct HostId(pub u32);

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Message priority.
///
/// The default is "no priority", which sorts after any explicit priority.
/// Among explicit priorities, a higher value is more important.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Priority(Option<i32>);

impl Priority {
    /// The "no priority" value.
    pub const NONE: Priority = Priority(None);

    /// An explicit priority; higher is more important.
    pub fn new(value: i32) -> Self {
        Priority(Some(value))
    }

    /// The explicit priority value, if any.
    pub fn value(&self) -> Option<i32> {
        self.0
    }
}

/// Class of a data item carried by a data message.
///
/// The engine only cares about this as a replication-density key; payload
/// semantics live in the application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataClass {
    Map,
    Marker,
    Skill,
    Resource,
}

/// Who a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipients {
    /// A single destination host.
    Unicast(HostId),
    /// Every host in the network.
    Broadcast,
    /// All members of a destination group.
    Multicast(GroupAddress),
    /// A data item bound for a single host.
    Data { to: HostId, class: DataClass },
}

/// A message carried through the network.
///
/// The id and creation time are shared by all replicas of a message and
/// identify it for deduplication; the forward count and hop path are
/// per-copy state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, identical for all replicas of this message.
    id: String,
    /// Originating host.
    from: HostId,
    /// Recipient(s).
    recipients: Recipients,
    /// Size in bytes.
    size: u64,
    /// Simulation time the original message was created.
    created: f64,
    priority: Priority,
    /// Time-to-live in seconds, or `None` for infinite.
    ttl: Option<f64>,
    /// Size of the requested response, or 0 if none is requested.
    response_size: u64,
    /// Id of the request this message responds to, if any.
    in_response_to: Option<String>,
    /// How often this copy has been forwarded by its current holder.
    forward_count: u32,
    /// Hosts this copy has passed.
    path: Vec<HostId>,
}

impl Message {
    /// Create a new message at simulation time `created`.
    pub fn new(
        id: impl Into<String>,
        from: HostId,
        recipients: Recipients,
        size: u64,
        created: f64,
    ) -> Self {
        Self {
            id: id.into(),
            from,
            recipients,
            size,
            created,
            priority: Priority::NONE,
            ttl: None,
            response_size: 0,
            in_response_to: None,
            forward_count: 0,
            path: vec![from],
        }
    }

    /// Set an explicit priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Priority::new(priority);
        self
    }

    /// Set the time-to-live in seconds.
    pub fn with_ttl(mut self, ttl: f64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Request a response of the given size from the final recipient.
    pub fn with_response_size(mut self, size: u64) -> Self {
        self.response_size = size;
        self
    }

    /// Mark this message as the response to a request message.
    pub fn as_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from(&self) -> HostId {
        self.from
    }

    pub fn recipients(&self) -> Recipients {
        self.recipients
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn creation_time(&self) -> f64 {
        self.created
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn response_size(&self) -> u64 {
        self.response_size
    }

    pub fn is_response(&self) -> bool {
        self.in_response_to.is_some()
    }

    pub fn forward_count(&self) -> u32 {
        self.forward_count
    }

    pub fn path(&self) -> &[HostId] {
        &self.path
    }

    pub fn hop_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// The single destination host of this message.
    ///
    /// # Panics
    ///
    /// Panics for broadcast and multicast messages, which have no single
    /// recipient. Asking them for one is a programming error in the caller,
    /// not a runtime condition; use [`Message::recipients`] to branch on
    /// the recipient kind instead.
    pub fn to(&self) -> HostId {
        match self.recipients {
            Recipients::Unicast(to) | Recipients::Data { to, .. } => to,
            Recipients::Broadcast => {
                panic!("message {}: broadcast messages have no single recipient", self.id)
            }
            Recipients::Multicast(group) => panic!(
                "message {}: multicast messages to group {} have no single recipient",
                self.id, group
            ),
        }
    }

    /// The data class, for data-carrying messages.
    pub fn data_class(&self) -> Option<DataClass> {
        match self.recipients {
            Recipients::Data { class, .. } => Some(class),
            _ => None,
        }
    }

    /// Whether `host` is a final recipient of this message.
    ///
    /// Unicast and data messages have exactly one final recipient; a
    /// broadcast treats every host as one; a multicast treats every member
    /// of its destination group as one.
    pub fn is_final_recipient(&self, host: HostId, groups: &GroupRegistry) -> bool {
        match self.recipients {
            Recipients::Unicast(to) | Recipients::Data { to, .. } => to == host,
            Recipients::Broadcast => true,
            Recipients::Multicast(address) => {
                groups.group(address).is_some_and(|g| g.contains(host))
            }
        }
    }

    /// Whether a successful send to `receiver` completes delivery.
    ///
    /// Only unicast and data messages ever complete: broadcast and
    /// multicast have no unique final delivery event.
    pub fn completes_delivery(&self, receiver: HostId) -> bool {
        match self.recipients {
            Recipients::Unicast(to) | Recipients::Data { to, .. } => to == receiver,
            Recipients::Broadcast | Recipients::Multicast(_) => false,
        }
    }

    /// Remaining time-to-live in seconds at `now`, negative if expired.
    pub fn remaining_ttl(&self, now: f64) -> f64 {
        match self.ttl {
            Some(ttl) => ttl - (now - self.created),
            None => f64::INFINITY,
        }
    }

    /// Whether this message must be purged as undeliverable.
    pub fn is_expired(&self, now: f64) -> bool {
        self.remaining_ttl(now) <= 0.0 && self.ttl.is_some()
    }

    /// Record a successful relay of this copy.
    pub fn record_forward(&mut self) {
        self.forward_count += 1;
    }

    /// Record a hop on the path of this copy.
    pub fn record_hop(&mut self, host: HostId) {
        self.path.push(host);
    }

    /// Create a replica for transfer to another host.
    ///
    /// The replica shares identity (id, creation time), recipients, size,
    /// priority and TTL with the original, and inherits its hop path, but
    /// starts a fresh life at the new holder: its forward count is zero.
    pub fn replicate(&self) -> Message {
        Message {
            id: self.id.clone(),
            from: self.from,
            recipients: self.recipients,
            size: self.size,
            created: self.created,
            priority: self.priority,
            ttl: self.ttl,
            response_size: self.response_size,
            in_response_to: self.in_response_to.clone(),
            forward_count: 0,
            path: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupRegistry;

    fn make_unicast(id: &str) -> Message {
        Message::new(id, HostId(0), Recipients::Unicast(HostId(1)), 100, 0.0)
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::new(5) > Priority::new(1));
        // "no priority" sorts below any explicit priority
        assert!(Priority::NONE < Priority::new(i32::MIN));
    }

    #[test]
    fn test_unicast_to() {
        let msg = make_unicast("M1");
        assert_eq!(msg.to(), HostId(1));
    }

    #[test]
    #[should_panic(expected = "no single recipient")]
    fn test_broadcast_to_panics() {
        let msg = Message::new("B1", HostId(0), Recipients::Broadcast, 100, 0.0);
        msg.to();
    }

    #[test]
    #[should_panic(expected = "no single recipient")]
    fn test_multicast_to_panics() {
        let msg = Message::new("G1", HostId(0), Recipients::Multicast(GroupAddress(3)), 100, 0.0);
        msg.to();
    }

    #[test]
    fn test_broadcast_final_recipients() {
        let groups = GroupRegistry::new();
        let msg = Message::new("B1", HostId(0), Recipients::Broadcast, 100, 0.0);
        assert!(msg.is_final_recipient(HostId(7), &groups));
        assert!(msg.is_final_recipient(HostId(42), &groups));
        assert!(!msg.completes_delivery(HostId(7)));
    }

    #[test]
    fn test_multicast_final_recipients_are_members() {
        let mut groups = GroupRegistry::new();
        let group = groups.create_group(GroupAddress(3)).unwrap();
        group.add_member(HostId(1));
        group.add_member(HostId(2));

        let msg = Message::new("G1", HostId(0), Recipients::Multicast(GroupAddress(3)), 100, 0.0);
        assert!(msg.is_final_recipient(HostId(1), &groups));
        assert!(msg.is_final_recipient(HostId(2), &groups));
        assert!(!msg.is_final_recipient(HostId(5), &groups));
        assert!(!msg.completes_delivery(HostId(1)));
    }

    #[test]
    fn test_unicast_completes_delivery_at_destination_only() {
        let msg = make_unicast("M1");
        assert!(msg.completes_delivery(HostId(1)));
        assert!(!msg.completes_delivery(HostId(2)));
    }

    #[test]
    fn test_ttl_expiry() {
        let msg = make_unicast("M1").with_ttl(10.0);
        assert!(!msg.is_expired(9.9));
        assert!(msg.is_expired(10.0));
        assert_eq!(msg.remaining_ttl(4.0), 6.0);
    }

    #[test]
    fn test_infinite_ttl_never_expires() {
        let msg = make_unicast("M1");
        assert!(!msg.is_expired(1e12));
        assert_eq!(msg.remaining_ttl(1e12), f64::INFINITY);
    }

    #[test]
    fn test_replicate_preserves_variant_and_destination() {
        let mut groups = GroupRegistry::new();
        groups.create_group(GroupAddress(9)).unwrap();

        for recipients in [
            Recipients::Unicast(HostId(1)),
            Recipients::Broadcast,
            Recipients::Multicast(GroupAddress(9)),
            Recipients::Data { to: HostId(2), class: DataClass::Map },
        ] {
            let mut original = Message::new("M1", HostId(0), recipients, 100, 5.0).with_priority(2);
            original.record_forward();

            let copy = original.replicate();
            assert_eq!(copy.recipients(), recipients);
            assert_eq!(copy.id(), original.id());
            assert_eq!(copy.creation_time(), original.creation_time());
            assert_eq!(copy.priority(), original.priority());
            // the copy starts a fresh forwarding life
            assert_eq!(copy.forward_count(), 0);
            assert_eq!(original.forward_count(), 1);
        }
    }

    #[test]
    fn test_forward_and_hop_tracking() {
        let mut msg = make_unicast("M1");
        assert_eq!(msg.hop_count(), 0);
        msg.record_forward();
        msg.record_hop(HostId(3));
        assert_eq!(msg.forward_count(), 1);
        assert_eq!(msg.hop_count(), 1);
        assert_eq!(msg.path(), &[HostId(0), HostId(3)]);
    }
}
