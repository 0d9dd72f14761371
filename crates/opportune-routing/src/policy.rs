//! Routing protocol variants.
//!
//! A [`RouterPolicy`] is the protocol-specific half of a router: it keeps
//! the estimator state for its protocol, digests what a met peer shares
//! about itself, and scores messages for forwarding. The transfer
//! orchestration around it lives in [`crate::router`] and is shared by all
//! variants.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use opportune_core::group::GroupRegistry;
use opportune_core::message::{HostId, Message, Recipients};

use crate::cost::{AckSet, MeetingConfig, MeetingEstimator, MeetingProbabilitySet};
use crate::density::{DensityConfig, ReplicationsDensityManager};
use crate::encounter::{EncounterConfig, EncounterValueManager};
use crate::error::{ConfigError, check_unit_range};
use crate::predictability::{DeliveryPredictabilityStore, PredictabilityConfig};

/// Which routing protocol a host runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RouterKind {
    /// Flood every message to every peer that does not hold it yet.
    #[default]
    Epidemic,
    /// Forward towards peers with higher delivery predictability.
    Predictability,
    /// Forward along cheaper expected meeting-probability paths.
    CostBased,
    /// Weight relays by encounter value, throttled by replications density.
    Disaster,
}

/// Full routing configuration for one host (or host group).
///
/// Only the section matching `kind` is consulted; the others keep their
/// defaults so one scenario file can describe several router kinds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub kind: RouterKind,
    pub predictability: PredictabilityConfig,
    pub meeting: MeetingConfig,
    pub encounter: EncounterConfig,
    pub density: DensityConfig,
    /// Replications density above which data replication stops, in [0, 1].
    pub replication_threshold: f64,
    /// Weight of the encounter ratio against delivery predictability in
    /// the disaster router's relay scoring, in [0, 1].
    pub encounter_weight: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            kind: RouterKind::Epidemic,
            predictability: PredictabilityConfig::default(),
            meeting: MeetingConfig::default(),
            encounter: EncounterConfig::default(),
            density: DensityConfig::default(),
            replication_threshold: 0.75,
            encounter_weight: 0.5,
        }
    }
}

impl RouterConfig {
    pub fn build(&self, host: HostId) -> Result<RouterPolicy, ConfigError> {
        Ok(match self.kind {
            RouterKind::Epidemic => RouterPolicy::Epidemic,
            RouterKind::Predictability => RouterPolicy::Predictability(
                DeliveryPredictabilityStore::new(host, self.predictability)?,
            ),
            RouterKind::CostBased => RouterPolicy::CostBased {
                estimator: MeetingEstimator::new(host, self.meeting)?,
                acks: AckSet::new(),
            },
            RouterKind::Disaster => {
                check_unit_range("replication threshold", self.replication_threshold)?;
                check_unit_range("encounter weight", self.encounter_weight)?;
                RouterPolicy::Disaster {
                    encounter: EncounterValueManager::new(self.encounter)?,
                    density: ReplicationsDensityManager::new(self.density)?,
                    predictability: DeliveryPredictabilityStore::new(host, self.predictability)?,
                    replication_threshold: self.replication_threshold,
                    encounter_weight: self.encounter_weight,
                }
            }
        })
    }
}

/// What one host tells a peer about itself when they meet.
#[derive(Debug, Clone)]
pub enum RoutingSummary {
    Epidemic,
    /// The host's delivery-predictability table, aged to the meeting time.
    Predictability(BTreeMap<HostId, f64>),
    /// The host's meeting probabilities, path costs and acknowledgements.
    CostBased {
        meeting_set: MeetingProbabilitySet,
        path_costs: BTreeMap<HostId, f64>,
        acks: AckSet,
    },
    /// The host's committed encounter value and predictability table.
    Disaster { encounter_value: f64, predictabilities: BTreeMap<HostId, f64> },
}

/// Protocol state and decision rules for one host.
#[derive(Debug, Clone)]
pub enum RouterPolicy {
    Epidemic,
    Predictability(DeliveryPredictabilityStore),
    CostBased { estimator: MeetingEstimator, acks: AckSet },
    Disaster {
        encounter: EncounterValueManager,
        density: ReplicationsDensityManager,
        predictability: DeliveryPredictabilityStore,
        replication_threshold: f64,
        encounter_weight: f64,
    },
}

impl RouterPolicy {
    pub fn kind(&self) -> RouterKind {
        match self {
            RouterPolicy::Epidemic => RouterKind::Epidemic,
            RouterPolicy::Predictability(_) => RouterKind::Predictability,
            RouterPolicy::CostBased { .. } => RouterKind::CostBased,
            RouterPolicy::Disaster { .. } => RouterKind::Disaster,
        }
    }

    /// Build the summary shared with a peer at contact time.
    pub fn summary(&self, now: f64) -> RoutingSummary {
        match self {
            RouterPolicy::Epidemic => RoutingSummary::Epidemic,
            RouterPolicy::Predictability(store) => {
                RoutingSummary::Predictability(store.snapshot(now))
            }
            RouterPolicy::CostBased { estimator, acks } => RoutingSummary::CostBased {
                meeting_set: estimator.own_set().clone(),
                path_costs: estimator.path_costs(),
                acks: acks.clone(),
            },
            RouterPolicy::Disaster { encounter, predictability, .. } => {
                RoutingSummary::Disaster {
                    encounter_value: encounter.encounter_value(),
                    predictabilities: predictability.snapshot(now),
                }
            }
        }
    }

    /// Digest a meeting with `peer`.
    ///
    /// Returns buffered message ids that became purgeable through the
    /// peer's acknowledgements. Mismatched summaries (a peer running a
    /// different protocol) still count as an encounter but share no state.
    pub fn on_contact(
        &mut self,
        peer: HostId,
        summary: &RoutingSummary,
        peer_carried: &BTreeSet<String>,
        own_carried: &BTreeSet<String>,
        now: f64,
    ) -> Vec<String> {
        match self {
            RouterPolicy::Epidemic => Vec::new(),
            RouterPolicy::Predictability(store) => {
                store.record_encounter(peer, now);
                if let RoutingSummary::Predictability(table) = summary {
                    store.record_transitive(peer, table, now);
                }
                Vec::new()
            }
            RouterPolicy::CostBased { estimator, acks } => {
                estimator.record_meeting(peer);
                if let RoutingSummary::CostBased { meeting_set, acks: peer_acks, .. } = summary {
                    estimator.learn_set(peer, meeting_set.clone());
                    acks.merge(peer_acks);
                }
                own_carried.iter().filter(|id| acks.contains(id)).cloned().collect()
            }
            RouterPolicy::Disaster { encounter, density, predictability, .. } => {
                encounter.add_encounter();
                density.add_encounter(peer, peer_carried.iter().map(String::as_str));
                predictability.record_encounter(peer, now);
                if let RoutingSummary::Disaster { predictabilities, .. } = summary {
                    predictability.record_transitive(peer, predictabilities, now);
                }
                Vec::new()
            }
        }
    }

    /// Advance windowed estimators to `now`.
    pub fn update(&mut self, now: f64) {
        if let RouterPolicy::Disaster { encounter, density, .. } = self {
            encounter.update(now);
            density.update(now);
        }
    }

    /// A message entered the local buffer.
    pub fn on_message_added(&mut self, message_id: &str) {
        if let RouterPolicy::Disaster { density, .. } = self {
            density.add_message(message_id);
        }
    }

    /// A message left the local buffer, for whatever reason.
    pub fn on_message_removed(&mut self, message_id: &str) {
        if let RouterPolicy::Disaster { density, .. } = self {
            density.remove_message(message_id);
        }
    }

    /// A message was delivered to a final recipient via this host.
    pub fn on_delivered(&mut self, message_id: &str) {
        if let RouterPolicy::CostBased { acks, .. } = self {
            acks.record(message_id);
        }
    }

    /// Whether `message` should be offered to `peer` at all.
    ///
    /// Final-recipient checks happen in the router; this only applies the
    /// protocol's own replication rules for intermediate relays.
    pub fn should_forward(
        &self,
        message: &Message,
        summary: &RoutingSummary,
        groups: &GroupRegistry,
        now: f64,
    ) -> bool {
        match self {
            RouterPolicy::Epidemic => true,
            RouterPolicy::Predictability(store) => {
                match destination_predictability(message.recipients(), groups, |dest| {
                    store.predictability(dest, now)
                }) {
                    // broadcast has no destination to estimate towards; flood
                    None => true,
                    Some(own) => {
                        summary_predictability(summary, message.recipients(), groups)
                            .is_some_and(|peer| peer > own)
                    }
                }
            }
            RouterPolicy::CostBased { estimator, .. } => match message.recipients() {
                Recipients::Unicast(destination) | Recipients::Data { to: destination, .. } => {
                    peer_path_cost(summary, destination) < estimator.cost_to(destination)
                }
                _ => true,
            },
            RouterPolicy::Disaster { density, replication_threshold, .. } => {
                density.density(message.id()) <= *replication_threshold
            }
        }
    }

    /// Protocol-specific utility of sending `message` to the summarized
    /// peer; higher is better. Used to break ties after priority.
    pub fn utility(
        &self,
        message: &Message,
        summary: &RoutingSummary,
        groups: &GroupRegistry,
        _now: f64,
    ) -> f64 {
        match self {
            RouterPolicy::Epidemic => 0.0,
            RouterPolicy::Predictability(_) => {
                summary_predictability(summary, message.recipients(), groups).unwrap_or(0.0)
            }
            RouterPolicy::CostBased { estimator, .. } => match message.recipients() {
                Recipients::Unicast(destination) | Recipients::Data { to: destination, .. } => {
                    // improvement over carrying the message ourselves
                    estimator.cost_to(destination) - peer_path_cost(summary, destination)
                }
                _ => 0.0,
            },
            RouterPolicy::Disaster { encounter, encounter_weight, .. } => {
                let RoutingSummary::Disaster { encounter_value, predictabilities } = summary
                else {
                    return 0.5;
                };
                let ratio = encounter.encounter_ratio(*encounter_value);
                let towards_destination =
                    destination_predictability(message.recipients(), groups, |dest| {
                        predictabilities.get(&dest).copied().unwrap_or(0.0)
                    })
                    .unwrap_or(0.0);
                encounter_weight * ratio + (1.0 - encounter_weight) * towards_destination
            }
        }
    }
}

/// Predictability towards a message's destination(s): the single value for
/// unicast and data, the best member for multicast, none for broadcast.
fn destination_predictability(
    recipients: Recipients,
    groups: &GroupRegistry,
    lookup: impl Fn(HostId) -> f64,
) -> Option<f64> {
    match recipients {
        Recipients::Unicast(to) | Recipients::Data { to, .. } => Some(lookup(to)),
        Recipients::Multicast(address) => {
            let group = groups.group(address)?;
            group.members().iter().map(|member| lookup(*member)).fold(None, |best, p| {
                Some(match best {
                    Some(b) if b >= p => b,
                    _ => p,
                })
            })
        }
        Recipients::Broadcast => None,
    }
}

fn summary_predictability(
    summary: &RoutingSummary,
    recipients: Recipients,
    groups: &GroupRegistry,
) -> Option<f64> {
    let table = match summary {
        RoutingSummary::Predictability(table) => table,
        RoutingSummary::Disaster { predictabilities, .. } => predictabilities,
        _ => return None,
    };
    destination_predictability(recipients, groups, |dest| {
        table.get(&dest).copied().unwrap_or(0.0)
    })
}

fn peer_path_cost(summary: &RoutingSummary, destination: HostId) -> f64 {
    match summary {
        RoutingSummary::CostBased { path_costs, .. } => {
            path_costs.get(&destination).copied().unwrap_or(f64::INFINITY)
        }
        _ => f64::INFINITY,
    }
}
