//! End-to-end scenarios over buffers, drop policies, groups and routing.

use std::cell::RefCell;
use std::rc::Rc;

use opportune_core::event::{EventLog, NetworkEvent};
use opportune_core::group::{GroupAddress, GroupRegistry};
use opportune_core::message::{HostId, Recipients};
use opportune_routing::drop_policy::DropPolicyKind;
use opportune_routing::policy::{RouterConfig, RouterKind};
use opportune_routing::router::{ActiveRouter, Admission};

use opportune_simulation::events::{ExternalEvent, MessageEvent};
use opportune_simulation::scenario::ScenarioConfig;
use opportune_simulation::world::World;

fn make_router(capacity: u64, drop_policy: DropPolicyKind) -> ActiveRouter {
    ActiveRouter::new(HostId(0), capacity, drop_policy, &RouterConfig::default()).unwrap()
}

fn unit_message(id: &str, created: f64) -> opportune_core::message::Message {
    opportune_core::message::Message::new(
        id,
        HostId(0),
        Recipients::Unicast(HostId(1)),
        1,
        created,
    )
}

fn evicted_ids(admission: Admission) -> Vec<String> {
    match admission {
        Admission::Stored { evicted } => {
            evicted.into_iter().map(|m| m.id().to_string()).collect()
        }
        Admission::Rejected(message) => panic!("{} should have been stored", message.id()),
    }
}

#[test]
fn test_fifo_overflow_evicts_two_oldest() {
    let mut router = make_router(3, DropPolicyKind::Fifo);
    for (id, created) in [("M1", 1.0), ("M2", 2.0), ("M3", 3.0)] {
        router.create_message(unit_message(id, created), created);
    }

    let big = opportune_core::message::Message::new(
        "M4",
        HostId(0),
        Recipients::Unicast(HostId(1)),
        2,
        4.0,
    );
    let evicted = evicted_ids(router.create_message(big, 4.0));
    assert_eq!(evicted, vec!["M1", "M2"]);
    assert!(router.buffer().contains("M3"));
    assert!(router.buffer().contains("M4"));
    assert!(router.buffer().occupied() <= 3);
}

#[test]
fn test_mofo_overflow_evicts_most_forwarded() {
    let mut router = make_router(3, DropPolicyKind::Mofo);
    for (id, created) in [("M1", 1.0), ("M2", 2.0), ("M3", 3.0)] {
        router.create_message(unit_message(id, created), created);
    }
    // M1 relayed three times, M3 twice, M2 once
    for (id, relays) in [("M1", 3), ("M2", 1), ("M3", 2)] {
        for _ in 0..relays {
            router.on_transfer_completed(id, false);
        }
    }

    let big = opportune_core::message::Message::new(
        "M4",
        HostId(0),
        Recipients::Unicast(HostId(1)),
        2,
        4.0,
    );
    let evicted = evicted_ids(router.create_message(big, 4.0));
    assert_eq!(evicted, vec!["M1", "M3"]);
    assert!(router.buffer().contains("M2"));
    assert!(router.buffer().contains("M4"));
}

#[test]
fn test_shli_overflow_evicts_shortest_remaining_life() {
    let mut router = make_router(3, DropPolicyKind::Shli);
    router.create_message(unit_message("M1", 0.0).with_ttl(10.0), 0.0);
    router.create_message(unit_message("M2", 0.0).with_ttl(8.0), 0.0);
    router.create_message(unit_message("M3", 0.0).with_ttl(7.0), 0.0);

    let big = opportune_core::message::Message::new(
        "M4",
        HostId(0),
        Recipients::Unicast(HostId(1)),
        2,
        1.0,
    );
    let evicted = evicted_ids(router.create_message(big, 1.0));
    assert_eq!(evicted, vec!["M3", "M2"]);
    assert!(router.buffer().contains("M1"));
}

#[test]
fn test_group_address_reuse_rejected() {
    let mut groups = GroupRegistry::new();
    groups.create_group(GroupAddress(7)).unwrap();
    assert!(groups.create_group(GroupAddress(7)).is_err());
}

#[test]
fn test_get_or_create_group_is_idempotent() {
    let mut groups = GroupRegistry::new();
    groups.get_or_create(GroupAddress(7)).add_member(HostId(1));
    // the second call must hand back the same group, members intact
    let again = groups.get_or_create(GroupAddress(7));
    assert_eq!(again.address(), GroupAddress(7));
    assert!(again.contains(HostId(1)));
    assert_eq!(groups.groups().count(), 1);
}

fn unicast_event(id: &str, time: f64, from: u32, to: u32, size: u64) -> ExternalEvent {
    ExternalEvent::CreateMessage(MessageEvent {
        time,
        id: id.to_string(),
        from: HostId(from),
        recipients: Recipients::Unicast(HostId(to)),
        size,
        response_size: 0,
        priority: None,
        ttl: None,
    })
}

fn attach_log(world: &mut World) -> Rc<RefCell<EventLog>> {
    let log = Rc::new(RefCell::new(EventLog::new()));
    world.register_listener(Box::new(Rc::clone(&log)));
    log
}

fn delivered(log: &Rc<RefCell<EventLog>>, message_id: &str) -> bool {
    log.borrow().iter().any(|event| {
        matches!(
            event,
            NetworkEvent::Transferred { id, first_delivery: true, .. } if id == message_id
        )
    })
}

#[test]
fn test_predictability_routing_relays_through_frequent_contact() {
    let mut config = ScenarioConfig {
        hosts: 3,
        buffer_capacity: 100,
        link_speed: 10,
        tick_interval: 1.0,
        events: vec![unicast_event("M1", 20.5, 0, 2, 10)],
        ..ScenarioConfig::default()
    };
    config.router.kind = RouterKind::Predictability;
    let mut world = World::new(&config).unwrap();
    let log = attach_log(&mut world);

    // host 1 meets host 2 repeatedly, building up predictability towards 2
    for round in 0..5 {
        let start = round as f64 * 4.0;
        world.set_connectivity(HostId(1), HostId(2), true);
        world.run_until(start + 2.0);
        world.set_connectivity(HostId(1), HostId(2), false);
        world.run_until(start + 4.0);
    }

    // now 0 (who never met 2) meets 1 carrying a message for 2
    world.run_until(21.0);
    world.set_connectivity(HostId(0), HostId(1), true);
    world.run_until(25.0);
    world.set_connectivity(HostId(0), HostId(1), false);

    // 1 is the better relay and got the copy; a final meeting delivers it
    assert!(world.host(HostId(1)).buffer().contains("M1"));
    world.set_connectivity(HostId(1), HostId(2), true);
    world.run_until(30.0);
    assert!(delivered(&log, "M1"));
}

#[test]
fn test_cost_routing_withholds_copies_from_unknown_relays() {
    let mut config = ScenarioConfig {
        hosts: 3,
        buffer_capacity: 100,
        link_speed: 10,
        tick_interval: 1.0,
        events: vec![unicast_event("M1", 0.5, 0, 2, 10)],
        ..ScenarioConfig::default()
    };
    config.router.kind = RouterKind::CostBased;
    let mut world = World::new(&config).unwrap();
    let log = attach_log(&mut world);

    // host 1 knows no path to 2, so it gets no copy
    world.set_connectivity(HostId(0), HostId(1), true);
    world.run_until(5.0);
    assert!(!world.host(HostId(1)).buffer().contains("M1"));
    world.set_connectivity(HostId(0), HostId(1), false);

    // meeting the destination delivers directly
    world.set_connectivity(HostId(0), HostId(2), true);
    world.run_until(10.0);
    assert!(delivered(&log, "M1"));
}

#[test]
fn test_epidemic_floods_a_chain() {
    let config = ScenarioConfig {
        hosts: 4,
        buffer_capacity: 100,
        link_speed: 10,
        tick_interval: 1.0,
        events: vec![unicast_event("M1", 0.5, 0, 3, 10)],
        ..ScenarioConfig::default()
    };
    let mut world = World::new(&config).unwrap();
    let log = attach_log(&mut world);

    world.set_connectivity(HostId(0), HostId(1), true);
    world.set_connectivity(HostId(1), HostId(2), true);
    world.set_connectivity(HostId(2), HostId(3), true);
    world.run_until(20.0);

    assert!(delivered(&log, "M1"));
    // intermediate hops still carry replicas
    assert!(world.host(HostId(1)).buffer().contains("M1"));
    assert!(world.host(HostId(2)).buffer().contains("M1"));
}

#[test]
fn test_multicast_delivers_only_to_members() {
    let mut config = ScenarioConfig {
        hosts: 3,
        buffer_capacity: 100,
        link_speed: 10,
        tick_interval: 1.0,
        groups: vec![opportune_simulation::scenario::GroupSpec {
            address: 1,
            members: vec![2],
        }],
        ..ScenarioConfig::default()
    };
    config.events = vec![ExternalEvent::CreateMessage(MessageEvent {
        time: 0.5,
        id: "G1".to_string(),
        from: HostId(0),
        recipients: Recipients::Multicast(GroupAddress(1)),
        size: 10,
        response_size: 0,
        priority: None,
        ttl: None,
    })];
    let mut world = World::new(&config).unwrap();
    let log = attach_log(&mut world);

    world.set_connectivity(HostId(0), HostId(1), true);
    world.set_connectivity(HostId(1), HostId(2), true);
    world.run_until(20.0);

    let log = log.borrow();
    let first_to: Vec<HostId> = log
        .iter()
        .filter_map(|event| match event {
            NetworkEvent::Transferred { to, first_delivery: true, .. } => Some(*to),
            _ => None,
        })
        .collect();
    // only the member counts as a delivery, the relay hop does not
    assert_eq!(first_to, vec![HostId(2)]);
}
