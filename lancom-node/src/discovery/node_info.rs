// Data model: SocketInfo, LocalNodeInfo, RemoteNodeInfo, and the
// wire-level Beacon record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Instant;

/// A reachable endpoint for a named channel (a service or a topic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketInfo {
    pub ip: IpAddr,
    pub port: u16,
}

impl std::fmt::Display for SocketInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tcp://{}:{}", self.ip, self.port)
    }
}

/// The wire format of a beacon: a field-tagged record, MessagePack
/// encoded. `services`/`topics` are `(name, port)` pairs rather than a map
/// so ordering is preserved and duplicate names round-trip harmlessly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beacon {
    pub node_id: String,
    pub name: String,
    pub ip: String,
    pub service_port: u16,
    pub revision: u64,
    pub services: Vec<(String, u16)>,
    pub topics: Vec<(String, u16)>,
}

#[derive(Debug, Clone, Default)]
struct LocalNodeInfoInner {
    services: HashMap<String, u16>,
    topics: HashMap<String, u16>,
    revision: u64,
}

/// This node's own description. Mutation is serialised behind a single
/// lock; every mutation bumps `revision`, which is what lets other nodes
/// tell a fresher beacon from a stale, reordered one.
pub struct LocalNodeInfo {
    name: String,
    node_id: String,
    ip: IpAddr,
    service_port: Mutex<u16>,
    inner: Mutex<LocalNodeInfoInner>,
}

impl LocalNodeInfo {
    pub fn new(name: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            name: name.into(),
            node_id: uuid::Uuid::new_v4().to_string(),
            ip,
            service_port: Mutex::new(0),
            inner: Mutex::new(LocalNodeInfoInner::default()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn service_port(&self) -> u16 {
        *self.service_port.lock().unwrap()
    }

    /// Record the port the node's reply socket bound to. Called once by
    /// `Node` at startup after `ServiceManager::bind`.
    pub fn set_service_port(&self, port: u16) {
        *self.service_port.lock().unwrap() = port;
        self.bump_revision();
    }

    pub fn register_service(&self, name: impl Into<String>, port: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.services.insert(name.into(), port);
        inner.revision += 1;
    }

    pub fn register_topic(&self, name: impl Into<String>, port: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.topics.insert(name.into(), port);
        inner.revision += 1;
    }

    pub fn deregister_topic(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.topics.remove(name).is_some() {
            inner.revision += 1;
        }
    }

    fn bump_revision(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.revision += 1;
    }

    /// Snapshot the current state as a wire-ready beacon.
    pub fn snapshot(&self) -> Beacon {
        let inner = self.inner.lock().unwrap();
        Beacon {
            node_id: self.node_id.clone(),
            name: self.name.clone(),
            ip: self.ip.to_string(),
            service_port: *self.service_port.lock().unwrap(),
            revision: inner.revision,
            services: inner.services.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            topics: inner.topics.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

/// A remote node as observed on the wire: same shape as `LocalNodeInfo`,
/// plus a revision and a last-seen timestamp used for liveness pruning.
#[derive(Debug, Clone)]
pub struct RemoteNodeInfo {
    pub node_id: String,
    pub name: String,
    pub ip: IpAddr,
    pub service_port: u16,
    pub revision: u64,
    pub services: HashMap<String, u16>,
    pub topics: HashMap<String, u16>,
    pub last_seen: Instant,
}

impl RemoteNodeInfo {
    pub fn from_beacon(beacon: &Beacon, now: Instant) -> Result<Self, std::net::AddrParseError> {
        Ok(Self {
            node_id: beacon.node_id.clone(),
            name: beacon.name.clone(),
            ip: beacon.ip.parse()?,
            service_port: beacon.service_port,
            revision: beacon.revision,
            services: beacon.services.iter().cloned().collect(),
            topics: beacon.topics.iter().cloned().collect(),
            last_seen: now,
        })
    }

    pub fn refresh_timestamp(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn update_from(&mut self, beacon: &Beacon, now: Instant) -> Result<(), std::net::AddrParseError> {
        self.name = beacon.name.clone();
        self.ip = beacon.ip.parse()?;
        self.service_port = beacon.service_port;
        self.revision = beacon.revision;
        self.services = beacon.services.iter().cloned().collect();
        self.topics = beacon.topics.iter().cloned().collect();
        self.last_seen = now;
        Ok(())
    }

    pub fn service_socket(&self, name: &str) -> Option<SocketInfo> {
        self.services.get(name).map(|&port| SocketInfo { ip: self.ip, port })
    }

    pub fn topic_sockets(&self) -> impl Iterator<Item = (&String, SocketInfo)> {
        self.topics
            .iter()
            .map(move |(name, &port)| (name, SocketInfo { ip: self.ip, port }))
    }
}
