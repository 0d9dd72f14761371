//! Multicast groups.
//!
//! Groups are keyed by a unique integer address. The registry is explicit
//! scenario-scoped state (not a global): it is created alongside the world
//! and must be cleared between independent simulation runs so that no group
//! state leaks across runs, notably in tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::message::HostId;

/// Address of a multicast group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct GroupAddress(pub u32);

impl std::fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A group of hosts used for multicast messaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    address: GroupAddress,
    members: Vec<HostId>,
}

impl Group {
    fn new(address: GroupAddress) -> Self {
        Self { address, members: Vec::new() }
    }

    pub fn address(&self) -> GroupAddress {
        self.address
    }

    /// Add a host to the group; joining twice is a no-op.
    pub fn add_member(&mut self, host: HostId) {
        if !self.members.contains(&host) {
            self.members.push(host);
        }
    }

    /// Whether the host is a member of this group.
    pub fn contains(&self, host: HostId) -> bool {
        self.members.contains(&host)
    }

    /// Member addresses in join order.
    pub fn members(&self) -> &[HostId] {
        &self.members
    }
}

/// Registry of all groups of a simulation run.
///
/// At most one group may exist per address; creating a duplicate is a
/// configuration/programming error, not a recoverable runtime condition.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: BTreeMap<GroupAddress, Group>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new group with the given address.
    ///
    /// Fails with [`CoreError::DuplicateGroup`] if the address is taken.
    pub fn create_group(&mut self, address: GroupAddress) -> Result<&mut Group, CoreError> {
        if self.groups.contains_key(&address) {
            return Err(CoreError::DuplicateGroup(address));
        }
        Ok(self.groups.entry(address).or_insert_with(|| Group::new(address)))
    }

    /// The group with the given address, if it exists.
    pub fn group(&self, address: GroupAddress) -> Option<&Group> {
        self.groups.get(&address)
    }

    /// The existing group with the given address, or a newly created one.
    ///
    /// Repeated calls with the same address always return the same group.
    pub fn get_or_create(&mut self, address: GroupAddress) -> &mut Group {
        self.groups.entry(address).or_insert_with(|| Group::new(address))
    }

    /// All groups, in address order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Clear the registry between simulation runs.
    pub fn clear(&mut self) {
        self.groups.clear();
    }
}
