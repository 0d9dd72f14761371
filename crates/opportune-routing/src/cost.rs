//! Cost-based routing state: meeting probabilities, expected path costs and
//! delivery acknowledgements.
//!
//! Each host counts who it meets and turns those counts into a normalized
//! meeting-probability set. Probability sets learned from peers form a
//! directed graph whose edge cost is `1 - P`; a single-source shortest-path
//! run over that graph yields the expected cost of reaching every known
//! destination. Acknowledged (delivered) message ids spread between peers so
//! redundant copies can be purged before their TTL runs out.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};

use opportune_core::message::HostId;

use crate::error::{ConfigError, check_unit_range};

/// Meeting-probability configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeetingConfig {
    /// Weight of a single new meeting, in [0, 1].
    pub alpha: f64,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

/// Normalized meeting probabilities of one host.
///
/// The probabilities always sum to 1 once at least one meeting happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingProbabilitySet {
    alpha: f64,
    probabilities: BTreeMap<HostId, f64>,
}

impl MeetingProbabilitySet {
    pub fn new(config: MeetingConfig) -> Result<Self, ConfigError> {
        check_unit_range("meeting probability alpha", config.alpha)?;
        Ok(Self { alpha: config.alpha, probabilities: BTreeMap::new() })
    }

    /// Record a meeting with `host` and renormalize.
    pub fn record_meeting(&mut self, host: HostId) {
        if self.probabilities.is_empty() {
            // the very first meeting gets the full probability mass
            self.probabilities.insert(host, 1.0);
            return;
        }
        *self.probabilities.entry(host).or_insert(0.0) += self.alpha;
        let norm = 1.0 + self.alpha;
        for value in self.probabilities.values_mut() {
            *value /= norm;
        }
    }

    /// The probability of meeting `host` next; 0 for never-met hosts.
    pub fn probability(&self, host: HostId) -> f64 {
        self.probabilities.get(&host).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (HostId, f64)> + '_ {
        self.probabilities.iter().map(|(host, p)| (*host, *p))
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }
}

/// Expected path costs to known destinations, via learned probability sets.
#[derive(Debug, Clone)]
pub struct MeetingEstimator {
    local: HostId,
    own: MeetingProbabilitySet,
    /// Probability sets learned from peers, keyed by their owner.
    learned: BTreeMap<HostId, MeetingProbabilitySet>,
}

/// Heap entry for the shortest-path run; min-heap via reversed ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CostEntry {
    cost: f64,
    host: HostId,
}

impl Eq for CostEntry {}

impl Ord for CostEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost).then_with(|| other.host.cmp(&self.host))
    }
}

impl PartialOrd for CostEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl MeetingEstimator {
    pub fn new(local: HostId, config: MeetingConfig) -> Result<Self, ConfigError> {
        Ok(Self { local, own: MeetingProbabilitySet::new(config)?, learned: BTreeMap::new() })
    }

    /// Record a direct meeting with `host`.
    pub fn record_meeting(&mut self, host: HostId) {
        self.own.record_meeting(host);
    }

    /// The local host's own probability set, for handing to a peer.
    pub fn own_set(&self) -> &MeetingProbabilitySet {
        &self.own
    }

    /// Adopt a probability set learned from `owner`.
    ///
    /// A newer set fully replaces an older one from the same owner.
    pub fn learn_set(&mut self, owner: HostId, set: MeetingProbabilitySet) {
        if owner != self.local {
            self.learned.insert(owner, set);
        }
    }

    fn edges_from(&self, host: HostId) -> Option<&MeetingProbabilitySet> {
        if host == self.local { Some(&self.own) } else { self.learned.get(&host) }
    }

    /// Expected cost of reaching every known destination from the local
    /// host, where a hop from `a` to `b` costs `1 - P_a(b)`.
    ///
    /// Destinations no known path leads to are absent from the result.
    pub fn path_costs(&self) -> BTreeMap<HostId, f64> {
        let mut costs: BTreeMap<HostId, f64> = BTreeMap::new();
        let mut heap = BinaryHeap::new();
        costs.insert(self.local, 0.0);
        heap.push(CostEntry { cost: 0.0, host: self.local });

        while let Some(CostEntry { cost, host }) = heap.pop() {
            if cost > costs.get(&host).copied().unwrap_or(f64::INFINITY) {
                continue; // stale heap entry
            }
            let Some(set) = self.edges_from(host) else { continue };
            for (next, probability) in set.iter() {
                let next_cost = cost + (1.0 - probability);
                if next_cost < costs.get(&next).copied().unwrap_or(f64::INFINITY) {
                    costs.insert(next, next_cost);
                    heap.push(CostEntry { cost: next_cost, host: next });
                }
            }
        }

        costs.remove(&self.local);
        costs
    }

    /// Expected cost of reaching `destination`; infinite when unknown.
    pub fn cost_to(&self, destination: HostId) -> f64 {
        self.path_costs().get(&destination).copied().unwrap_or(f64::INFINITY)
    }
}

/// Ids of messages known to have reached a final recipient.
///
/// Spread opportunistically between peers so copies of already-delivered
/// messages get purged instead of riding out their TTL.
#[derive(Debug, Clone, Default)]
pub struct AckSet {
    delivered: BTreeSet<String>,
}

impl AckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message_id: &str) {
        self.delivered.insert(message_id.to_string());
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.delivered.contains(message_id)
    }

    /// Merge a peer's acknowledgements into this set.
    pub fn merge(&mut self, other: &AckSet) {
        for id in &other.delivered {
            self.delivered.insert(id.clone());
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.delivered.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn make_set() -> MeetingProbabilitySet {
        MeetingProbabilitySet::new(MeetingConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        assert!(MeetingProbabilitySet::new(MeetingConfig { alpha: -0.1 }).is_err());
        assert!(MeetingProbabilitySet::new(MeetingConfig { alpha: 1.5 }).is_err());
    }

    #[test]
    fn test_first_meeting_takes_all_probability() {
        let mut set = make_set();
        set.record_meeting(HostId(1));
        assert_eq!(set.probability(HostId(1)), 1.0);
        assert_eq!(set.probability(HostId(2)), 0.0);
    }

    #[test]
    fn test_probabilities_stay_normalized() {
        let mut set = make_set();
        set.record_meeting(HostId(1));
        set.record_meeting(HostId(2));
        set.record_meeting(HostId(1));

        let total: f64 = set.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < EPSILON);
        assert!(set.probability(HostId(1)) > set.probability(HostId(2)));
    }

    #[test]
    fn test_path_cost_prefers_reliable_chain() {
        // 0 meets 1 often; 1 meets 2 exclusively. The two-hop chain to 2
        // must cost less than an untraveled direct edge (which is absent).
        let mut estimator = MeetingEstimator::new(HostId(0), MeetingConfig::default()).unwrap();
        estimator.record_meeting(HostId(1));

        let mut peer_set = make_set();
        peer_set.record_meeting(HostId(2));
        estimator.learn_set(HostId(1), peer_set);

        let costs = estimator.path_costs();
        assert_eq!(costs.get(&HostId(1)), Some(&0.0));
        assert_eq!(costs.get(&HostId(2)), Some(&0.0));
        assert!(estimator.cost_to(HostId(3)).is_infinite());
    }

    #[test]
    fn test_path_cost_picks_cheaper_route() {
        let mut estimator = MeetingEstimator::new(HostId(0), MeetingConfig::default()).unwrap();
        // split own probability between 1 and 2
        estimator.record_meeting(HostId(1));
        estimator.record_meeting(HostId(2));

        // 1 always meets 3; 2 never heard of 3
        let mut via_one = make_set();
        via_one.record_meeting(HostId(3));
        estimator.learn_set(HostId(1), via_one);

        let costs = estimator.path_costs();
        let via_one_cost = (1.0 - estimator.own_set().probability(HostId(1))) + 0.0;
        assert!((costs[&HostId(3)] - via_one_cost).abs() < EPSILON);
    }

    #[test]
    fn test_own_set_never_replaced_by_learning() {
        let mut estimator = MeetingEstimator::new(HostId(0), MeetingConfig::default()).unwrap();
        estimator.record_meeting(HostId(1));

        let mut bogus = make_set();
        bogus.record_meeting(HostId(9));
        estimator.learn_set(HostId(0), bogus);

        assert_eq!(estimator.own_set().probability(HostId(1)), 1.0);
    }

    #[test]
    fn test_ack_set_merge() {
        let mut mine = AckSet::new();
        mine.record("M1");
        let mut theirs = AckSet::new();
        theirs.record("M2");

        mine.merge(&theirs);
        assert!(mine.contains("M1"));
        assert!(mine.contains("M2"));
        assert!(!mine.contains("M3"));
    }
}
