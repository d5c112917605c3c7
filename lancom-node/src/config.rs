// Node and discovery configuration: a primary constructor with the
// required fields, `with_*` methods for the rest.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Discovery-specific knobs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    pub beacon_period: Duration,
    /// Multiplier applied to `beacon_period` to get the liveness window.
    pub liveness_multiplier: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_group: Ipv4Addr::new(224, 0, 0, 1),
            multicast_port: 7720,
            beacon_period: Duration::from_secs(1),
            liveness_multiplier: 3,
        }
    }
}

impl DiscoveryConfig {
    pub fn liveness_window(&self) -> Duration {
        self.beacon_period * self.liveness_multiplier
    }
}

/// Top-level configuration passed to `Node::init`.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub ip: IpAddr,
    pub discovery: DiscoveryConfig,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            name: name.into(),
            ip,
            discovery: DiscoveryConfig::default(),
        }
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_multicast_group(mut self, group: Ipv4Addr, port: u16) -> Self {
        self.discovery.multicast_group = group;
        self.discovery.multicast_port = port;
        self
    }
}
