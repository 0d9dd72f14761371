//! The world: hosts, connections and the discrete-event scheduler.
//!
//! Time advances in fixed ticks, with optional one-shot finer ticks from
//! the scheduled-updates queue. Every tick resolves, in order: externally
//! supplied connectivity changes, due transfer completions, router updates
//! (TTL sweeps and estimator ticks), new transfer starts on idle
//! connections, and external events scheduled for the elapsed interval.
//! Hosts are iterated in stable id order throughout, so a run is fully
//! reproducible from its scenario.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::{debug, info, trace};

use opportune_core::clock::SimClock;
use opportune_core::connection::Connection;
use opportune_core::event::{ListenerRegistry, NetworkEvent, NetworkListener};
use opportune_core::group::{GroupAddress, GroupRegistry};
use opportune_core::message::{HostId, Message};
use opportune_routing::router::{ActiveRouter, Admission};

use crate::events::{EventOccurrence, EventQueue, MessageEvent, ScheduledUpdatesQueue};
use crate::scenario::{ScenarioConfig, ScenarioError};

/// Connection key, normalized so (a, b) and (b, a) collide.
type PairKey = (HostId, HostId);

fn pair_key(a: HostId, b: HostId) -> PairKey {
    if a.0 <= b.0 { (a, b) } else { (b, a) }
}

/// One simulation run's state.
///
/// A world is built fresh per run from a validated scenario; nothing leaks
/// between runs because clock, groups and host state all live here.
pub struct World {
    clock: Rc<SimClock>,
    tick_interval: f64,
    link_speed: u64,
    default_ttl: Option<f64>,
    hosts: Vec<ActiveRouter>,
    connections: BTreeMap<PairKey, Connection>,
    /// Connectivity changes reported since the last tick, applied in order.
    pending_connectivity: Vec<(HostId, HostId, bool)>,
    groups: GroupRegistry,
    listeners: ListenerRegistry,
    events: EventQueue,
    scheduled: ScheduledUpdatesQueue,
    /// Ids that already reached a final recipient somewhere.
    delivered_once: BTreeSet<String>,
}

impl World {
    pub fn new(config: &ScenarioConfig) -> Result<Self, ScenarioError> {
        config.validate()?;

        let mut hosts = Vec::with_capacity(config.hosts);
        for index in 0..config.hosts {
            hosts.push(ActiveRouter::new(
                HostId(index as u32),
                config.buffer_capacity,
                config.drop_policy,
                &config.router,
            )?);
        }

        let mut groups = GroupRegistry::new();
        for spec in &config.groups {
            let group = groups.create_group(GroupAddress(spec.address))?;
            for &member in &spec.members {
                group.add_member(HostId(member));
            }
        }

        info!(
            hosts = config.hosts,
            router = ?config.router.kind,
            drop_policy = ?config.drop_policy,
            "world ready"
        );
        Ok(Self {
            clock: Rc::new(SimClock::new()),
            tick_interval: config.tick_interval,
            link_speed: config.link_speed,
            default_ttl: config.default_ttl,
            hosts,
            connections: BTreeMap::new(),
            pending_connectivity: Vec::new(),
            groups,
            listeners: ListenerRegistry::new(),
            events: EventQueue::load(config.events.clone())?,
            scheduled: ScheduledUpdatesQueue::new(),
            delivered_once: BTreeSet::new(),
        })
    }

    pub fn clock(&self) -> Rc<SimClock> {
        Rc::clone(&self.clock)
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn register_listener(&mut self, listener: Box<dyn NetworkListener>) {
        self.listeners.register(listener);
    }

    pub fn host(&self, host: HostId) -> &ActiveRouter {
        &self.hosts[host.0 as usize]
    }

    pub fn hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub fn connection(&self, a: HostId, b: HostId) -> Option<&Connection> {
        self.connections.get(&pair_key(a, b))
    }

    /// Report a range change from the movement collaborator.
    ///
    /// Takes effect at the start of the next tick.
    pub fn set_connectivity(&mut self, a: HostId, b: HostId, in_range: bool) {
        if a != b {
            self.pending_connectivity.push((a, b, in_range));
        }
    }

    /// Request a one-shot tick at `time`, finer than the regular interval.
    pub fn request_update(&mut self, time: f64) {
        self.scheduled.request(time);
    }

    /// When the next tick runs: the regular interval, or earlier if an
    /// ad-hoc update was requested.
    pub fn next_tick_time(&self) -> f64 {
        let regular = self.clock.now() + self.tick_interval;
        match self.scheduled.next_time() {
            Some(requested) if requested > self.clock.now() => regular.min(requested),
            _ => regular,
        }
    }

    /// Advance one tick.
    pub fn step(&mut self) {
        let now = self.next_tick_time();
        self.clock.set(now);
        self.scheduled.pop_due(now);
        trace!(time = now, "tick");

        self.apply_connectivity(now);
        self.complete_transfers(now);
        self.update_routers(now);
        self.start_transfers(now);
        self.process_external_events(now);
    }

    /// Run ticks until the clock would pass `end`.
    pub fn run_until(&mut self, end: f64) {
        while self.next_tick_time() <= end {
            self.step();
        }
    }

    fn apply_connectivity(&mut self, now: f64) {
        let changes = std::mem::take(&mut self.pending_connectivity);
        for (a, b, in_range) in changes {
            let key = pair_key(a, b);
            if in_range {
                if self.connections.contains_key(&key) {
                    continue;
                }
                self.connections.insert(key, Connection::new(a, b, self.link_speed));
                debug!(a = a.0, b = b.0, "connection up");
                self.listeners.notify(&NetworkEvent::ConnectionUp { a, b, time: now });

                let view_a = self.hosts[a.0 as usize].peer_view(now);
                let view_b = self.hosts[b.0 as usize].peer_view(now);
                let purged_a = self.hosts[a.0 as usize].on_connection_up(&view_b, now);
                let purged_b = self.hosts[b.0 as usize].on_connection_up(&view_a, now);
                for message in purged_a {
                    self.notify_deleted(message.id(), a, false, now);
                }
                for message in purged_b {
                    self.notify_deleted(message.id(), b, false, now);
                }
            } else if let Some(mut connection) = self.connections.remove(&key) {
                if let Some(transfer) = connection.close(now) {
                    let to = connection.other(transfer.from);
                    debug!(message = transfer.message.id(), "transfer aborted by link loss");
                    self.listeners.notify(&NetworkEvent::TransferAborted {
                        id: transfer.message.id().to_string(),
                        from: transfer.from,
                        to,
                        time: now,
                    });
                }
                self.listeners.notify(&NetworkEvent::ConnectionDown { a, b, time: now });
                self.hosts[a.0 as usize].on_connection_down(b, now);
                self.hosts[b.0 as usize].on_connection_down(a, now);
            }
        }
    }

    fn complete_transfers(&mut self, now: f64) {
        let due: Vec<PairKey> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_transfer_done(now))
            .map(|(key, _)| *key)
            .collect();

        for key in due {
            let Some(connection) = self.connections.get_mut(&key) else { continue };
            let Some(transfer) = connection.complete_transfer() else { continue };
            let sender = transfer.from;
            let receiver = connection.other(sender);
            let message = transfer.message;
            let id = message.id().to_string();
            let completes = message.completes_delivery(receiver);

            let reception = self.hosts[receiver.0 as usize].receive(message, &self.groups, now);
            let first_delivery = reception.delivered && self.delivered_once.insert(id.clone());
            debug!(
                message = %id,
                from = sender.0,
                to = receiver.0,
                delivered = reception.delivered,
                "transfer complete"
            );
            self.listeners.notify(&NetworkEvent::Transferred {
                id: id.clone(),
                from: sender,
                to: receiver,
                first_delivery,
                time: now,
            });

            for victim in &reception.evicted {
                self.notify_deleted(victim.id(), receiver, true, now);
            }
            if let Some(rejected) = &reception.rejected {
                self.notify_deleted(rejected.id(), receiver, true, now);
            }

            self.hosts[sender.0 as usize].on_transfer_completed(&id, completes);

            if let Some(response) = reception.response {
                self.admit_created(receiver, response, now);
            }
        }
    }

    fn update_routers(&mut self, now: f64) {
        for index in 0..self.hosts.len() {
            let expired = self.hosts[index].update(now);
            for message in expired {
                self.notify_deleted(message.id(), HostId(index as u32), false, now);
            }
        }
    }

    fn start_transfers(&mut self, now: f64) {
        for index in 0..self.hosts.len() {
            let host = HostId(index as u32);
            let idle: Vec<PairKey> = self
                .connections
                .iter()
                .filter(|((a, b), connection)| {
                    (*a == host || *b == host) && connection.is_ready_for_transfer()
                })
                .map(|(key, _)| *key)
                .collect();

            for key in idle {
                let peer = if key.0 == host { key.1 } else { key.0 };
                let view = self.hosts[peer.0 as usize].peer_view(now);
                let Some(plan) = self.hosts[index].plan_send(&[view], &self.groups, now) else {
                    continue;
                };
                let Some(message) = self.hosts[index].buffer().get(&plan.message_id) else {
                    continue;
                };
                let Some(connection) = self.connections.get_mut(&key) else { continue };
                if connection.start_transfer(now, host, message).is_ok() {
                    trace!(message = %plan.message_id, from = host.0, to = peer.0, "transfer started");
                    self.listeners.notify(&NetworkEvent::TransferStarted {
                        id: plan.message_id,
                        from: host,
                        to: peer,
                        time: now,
                    });
                }
            }
        }
    }

    fn process_external_events(&mut self, now: f64) {
        for (time, occurrence) in self.events.drain_due(now) {
            match occurrence {
                EventOccurrence::CreateMessage(event) => {
                    let message = self.build_message(event, time);
                    let host = message.from();
                    self.admit_created(host, message, now);
                }
                EventOccurrence::EmergencyStart { id } => {
                    info!(emergency = id, "emergency started");
                    self.listeners.notify(&NetworkEvent::EmergencyStarted { id, time: now });
                }
                EventOccurrence::EmergencyEnd { id } => {
                    info!(emergency = id, "emergency ended");
                    self.listeners.notify(&NetworkEvent::EmergencyEnded { id, time: now });
                }
            }
            // react sooner than the next regular tick
            self.scheduled.request(now + self.tick_interval / 10.0);
        }
    }

    fn build_message(&self, event: MessageEvent, time: f64) -> Message {
        let mut message =
            Message::new(event.id, event.from, event.recipients, event.size, time);
        if let Some(priority) = event.priority {
            message = message.with_priority(priority);
        }
        if let Some(ttl) = event.ttl.or(self.default_ttl) {
            message = message.with_ttl(ttl);
        }
        if event.response_size > 0 {
            message = message.with_response_size(event.response_size);
        }
        message
    }

    fn admit_created(&mut self, host: HostId, message: Message, now: f64) {
        let id = message.id().to_string();
        match self.hosts[host.0 as usize].create_message(message, now) {
            Admission::Stored { evicted } => {
                self.listeners.notify(&NetworkEvent::MessageCreated {
                    id,
                    host,
                    time: now,
                });
                for victim in evicted {
                    self.notify_deleted(victim.id(), host, true, now);
                }
            }
            Admission::Rejected(rejected) => {
                debug!(message = rejected.id(), host = host.0, "created message rejected");
                self.notify_deleted(rejected.id(), host, true, now);
            }
        }
    }

    fn notify_deleted(&mut self, id: &str, host: HostId, dropped: bool, now: f64) {
        self.listeners.notify(&NetworkEvent::MessageDeleted {
            id: id.to_string(),
            host,
            dropped,
            time: now,
        });
    }
}
