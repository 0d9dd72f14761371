//! Message and connection lifecycle notifications.
//!
//! Reports, visualization and statistics consume these events. Fan-out is
//! an explicit registry of callback targets invoked synchronously in
//! registration order (never implicit event-loop dispatch), so outcomes
//! stay reproducible.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::message::HostId;

/// Events fired by the routing and transfer engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkEvent {
    /// A locally originated message was admitted into its creator's buffer.
    MessageCreated { id: String, host: HostId, time: f64 },
    /// A transfer started on a connection.
    TransferStarted { id: String, from: HostId, to: HostId, time: f64 },
    /// A transfer completed.
    ///
    /// `first_delivery` is true when this was the first time the message
    /// reached a final recipient.
    Transferred { id: String, from: HostId, to: HostId, first_delivery: bool, time: f64 },
    /// An in-progress transfer was aborted (link went down mid-transfer).
    TransferAborted { id: String, from: HostId, to: HostId, time: f64 },
    /// A message left a host's buffer.
    ///
    /// `dropped` is true for drop-policy evictions and overflow rejections,
    /// false for TTL expiry and acknowledgment-driven purges.
    MessageDeleted { id: String, host: HostId, dropped: bool, time: f64 },
    /// Two hosts came into range and a connection was established.
    ConnectionUp { a: HostId, b: HostId, time: f64 },
    /// Two hosts went out of range.
    ConnectionDown { a: HostId, b: HostId, time: f64 },
    /// An externally scheduled emergency period began.
    EmergencyStarted { id: u32, time: f64 },
    /// An externally scheduled emergency period ended.
    EmergencyEnded { id: u32, time: f64 },
}

impl NetworkEvent {
    /// Simulation time the event occurred at.
    pub fn time(&self) -> f64 {
        match self {
            NetworkEvent::MessageCreated { time, .. }
            | NetworkEvent::TransferStarted { time, .. }
            | NetworkEvent::Transferred { time, .. }
            | NetworkEvent::TransferAborted { time, .. }
            | NetworkEvent::MessageDeleted { time, .. }
            | NetworkEvent::ConnectionUp { time, .. }
            | NetworkEvent::ConnectionDown { time, .. }
            | NetworkEvent::EmergencyStarted { time, .. }
            | NetworkEvent::EmergencyEnded { time, .. } => *time,
        }
    }
}

/// A consumer of [`NetworkEvent`]s (reports, GUI, statistics).
pub trait NetworkListener {
    fn on_event(&mut self, event: &NetworkEvent);
}

/// Shared listeners can be registered and inspected from outside the world.
impl<L: NetworkListener> NetworkListener for Rc<RefCell<L>> {
    fn on_event(&mut self, event: &NetworkEvent) {
        self.borrow_mut().on_event(event);
    }
}

/// Registry of listeners, notified synchronously in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Box<dyn NetworkListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn NetworkListener>) {
        self.listeners.push(listener);
    }

    pub fn notify(&mut self, event: &NetworkEvent) {
        for listener in &mut self.listeners {
            listener.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// An append-only record of every event of a run; itself a listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    pub events: Vec<NetworkEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkEvent> {
        self.events.iter()
    }
}

impl NetworkListener for EventLog {
    fn on_event(&mut self, event: &NetworkEvent) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        seen: usize,
    }

    impl NetworkListener for Counter {
        fn on_event(&mut self, _event: &NetworkEvent) {
            self.seen += 1;
        }
    }

    #[test]
    fn test_listeners_notified_in_order() {
        let log = Rc::new(RefCell::new(EventLog::new()));
        let counter = Rc::new(RefCell::new(Counter { seen: 0 }));

        let mut registry = ListenerRegistry::new();
        registry.register(Box::new(Rc::clone(&log)));
        registry.register(Box::new(Rc::clone(&counter)));

        let event = NetworkEvent::ConnectionUp { a: HostId(0), b: HostId(1), time: 1.0 };
        registry.notify(&event);
        registry.notify(&NetworkEvent::ConnectionDown { a: HostId(0), b: HostId(1), time: 2.0 });

        assert_eq!(log.borrow().len(), 2);
        assert_eq!(counter.borrow().seen, 2);
        assert_eq!(log.borrow().events[0], event);
    }
}
