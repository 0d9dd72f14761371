//! Scenario configuration.
//!
//! A scenario fully describes one run: the host population and its buffers,
//! link characteristics, routing and drop-policy choices, groups and the
//! external event stream. Everything is validated before the world is
//! built; a simulation never starts from an invalid configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use opportune_routing::drop_policy::DropPolicyKind;
use opportune_routing::error::ConfigError;
use opportune_routing::policy::RouterConfig;

use crate::events::{EventError, ExternalEvent};

/// Errors detected while validating a scenario, fatal at setup time.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario needs at least two hosts, got {0}")]
    TooFewHosts(usize),

    #[error("buffer capacity must be positive")]
    ZeroBufferCapacity,

    #[error("link speed must be positive")]
    ZeroLinkSpeed,

    #[error("tick interval must be positive, got {0}")]
    NonPositiveTickInterval(f64),

    #[error("default TTL must be positive, got {0}")]
    NonPositiveTtl(f64),

    #[error("group {address} lists member {member} outside the host range")]
    UnknownGroupMember { address: u32, member: u32 },

    #[error(transparent)]
    Routing(#[from] ConfigError),

    #[error(transparent)]
    Events(#[from] EventError),

    #[error(transparent)]
    Core(#[from] opportune_core::error::CoreError),
}

/// A multicast group definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub address: u32,
    pub members: Vec<u32>,
}

/// Complete configuration of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Number of hosts; host ids run from 0 to `hosts - 1`.
    pub hosts: usize,
    /// Per-host buffer capacity in bytes.
    pub buffer_capacity: u64,
    /// Link speed in bytes per second, shared by all connections.
    pub link_speed: u64,
    /// Regular scheduler tick interval in seconds.
    pub tick_interval: f64,
    /// TTL applied to messages whose creation event specifies none.
    #[serde(default)]
    pub default_ttl: Option<f64>,
    /// Buffer eviction strategy for every host.
    #[serde(default)]
    pub drop_policy: DropPolicyKind,
    /// Routing protocol and estimator parameters for every host.
    #[serde(default)]
    pub router: RouterConfig,
    /// Multicast groups.
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    /// External events, ordered by effect time.
    #[serde(default)]
    pub events: Vec<ExternalEvent>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            hosts: 2,
            buffer_capacity: 1_000_000,
            link_speed: 250_000,
            tick_interval: 0.1,
            default_ttl: None,
            drop_policy: DropPolicyKind::default(),
            router: RouterConfig::default(),
            groups: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.hosts < 2 {
            return Err(ScenarioError::TooFewHosts(self.hosts));
        }
        if self.buffer_capacity == 0 {
            return Err(ScenarioError::ZeroBufferCapacity);
        }
        if self.link_speed == 0 {
            return Err(ScenarioError::ZeroLinkSpeed);
        }
        if self.tick_interval <= 0.0 {
            return Err(ScenarioError::NonPositiveTickInterval(self.tick_interval));
        }
        if let Some(ttl) = self.default_ttl {
            if ttl <= 0.0 {
                return Err(ScenarioError::NonPositiveTtl(ttl));
            }
        }
        for group in &self.groups {
            for &member in &group.members {
                if member as usize >= self.hosts {
                    return Err(ScenarioError::UnknownGroupMember {
                        address: group.address,
                        member,
                    });
                }
            }
        }
        // building the router surfaces estimator parameter errors early
        self.router.build(opportune_core::message::HostId(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opportune_routing::policy::RouterKind;

    #[test]
    fn test_default_scenario_is_valid() {
        assert!(ScenarioConfig::default().validate().is_ok());
    }

    #[test]
    fn test_single_host_rejected() {
        let config = ScenarioConfig { hosts: 1, ..ScenarioConfig::default() };
        assert!(matches!(config.validate(), Err(ScenarioError::TooFewHosts(1))));
    }

    #[test]
    fn test_zero_window_length_fails_validation() {
        let mut config = ScenarioConfig::default();
        config.router.kind = RouterKind::Disaster;
        config.router.encounter.window_length = 0.0;
        assert!(matches!(config.validate(), Err(ScenarioError::Routing(_))));
    }

    #[test]
    fn test_group_member_out_of_range_rejected() {
        let config = ScenarioConfig {
            hosts: 3,
            groups: vec![GroupSpec { address: 1, members: vec![0, 7] }],
            ..ScenarioConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ScenarioError::UnknownGroupMember { address: 1, member: 7 })
        ));
    }
}
