// The process-wide directory of remote nodes.
//
// `nodes`, `service_index` and `publisher_index` live behind a single
// lock; watchers are invoked only after the lock is released, from a
// cloned snapshot of the watcher list, so a re-entrant subscribe/
// unsubscribe inside a callback can't deadlock.

use super::node_info::{Beacon, RemoteNodeInfo, SocketInfo};
use lancom_common::logging::{Component, Logger, LoggingContext};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub type ChangeToken = u64;
type Watcher = Arc<dyn Fn(&HashSet<String>) + Send + Sync>;

#[derive(Default)]
struct ManagerState {
    nodes: HashMap<String, RemoteNodeInfo>,
    service_index: HashMap<String, SocketInfo>,
    publisher_index: HashMap<String, Vec<SocketInfo>>,
    watchers: HashMap<ChangeToken, Watcher>,
    next_token: ChangeToken,
}

pub struct NodeInfoManager {
    state: Mutex<ManagerState>,
    logger: Logger,
}

impl NodeInfoManager {
    pub fn new(logger: Logger) -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
            logger,
        }
    }

    /// Deterministic winner for a service name: lexicographically smallest
    /// `nodeID` among live advertisers.
    pub fn get_service_info(&self, service_name: &str) -> Option<SocketInfo> {
        self.state.lock().unwrap().service_index.get(service_name).copied()
    }

    /// All live publishers of a topic, in a stable order.
    pub fn get_publisher_info(&self, topic_name: &str) -> Vec<SocketInfo> {
        self.state
            .lock()
            .unwrap()
            .publisher_index
            .get(topic_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Register a change watcher. Returns a token usable with
    /// [`NodeInfoManager::unsubscribe`].
    pub fn subscribe_changes<F>(&self, callback: F) -> ChangeToken
    where
        F: Fn(&HashSet<String>) + Send + Sync + 'static,
    {
        let mut state = self.state.lock().unwrap();
        let token = state.next_token;
        state.next_token += 1;
        state.watchers.insert(token, Arc::new(callback));
        token
    }

    pub fn unsubscribe(&self, token: ChangeToken) {
        self.state.lock().unwrap().watchers.remove(&token);
    }

    /// Apply a freshly-received beacon. Returns nothing: observers react
    /// via watchers.
    pub(crate) fn apply_beacon(&self, local_node_id: &str, beacon: Beacon, now: Instant) {
        if beacon.node_id == local_node_id {
            // Never insert our own nodeID.
            return;
        }

        let changed_topics = {
            let mut state = self.state.lock().unwrap();
            let mut changed = false;

            match state.nodes.get_mut(&beacon.node_id) {
                None => {
                    let info = match RemoteNodeInfo::from_beacon(&beacon, now) {
                        Ok(info) => info,
                        Err(e) => {
                            self.logger.warn(format!(
                                "dropping beacon from '{}' with unparseable ip: {e}",
                                beacon.node_id
                            ));
                            return;
                        }
                    };
                    state.nodes.insert(beacon.node_id.clone(), info);
                    changed = true;
                }
                Some(existing) if beacon.revision > existing.revision => {
                    if let Err(e) = existing.update_from(&beacon, now) {
                        self.logger.warn(format!(
                            "dropping beacon from '{}' with unparseable ip: {e}",
                            beacon.node_id
                        ));
                        return;
                    }
                    changed = true;
                }
                Some(existing) => {
                    // Stale or equal revision: only refresh last-seen.
                    existing.refresh_timestamp(now);
                }
            }

            if !changed {
                return;
            }

            rebuild_indices(&mut state)
        };

        self.fire_watchers(changed_topics);
    }

    /// Evict entries whose `last_seen` predates `now - liveness_window`.
    pub(crate) fn sweep(&self, liveness_window: Duration, now: Instant) {
        let changed_topics = {
            let mut state = self.state.lock().unwrap();
            let stale: Vec<String> = state
                .nodes
                .iter()
                .filter(|(_, info)| now.duration_since(info.last_seen) > liveness_window)
                .map(|(id, _)| id.clone())
                .collect();

            if stale.is_empty() {
                return;
            }

            for node_id in &stale {
                state.nodes.remove(node_id);
                self.logger.info(format!("evicted stale node '{node_id}'"));
            }

            rebuild_indices(&mut state)
        };

        self.fire_watchers(changed_topics);
    }

    fn fire_watchers(&self, changed_topics: HashSet<String>) {
        if changed_topics.is_empty() {
            return;
        }
        let watchers: Vec<Watcher> = {
            let state = self.state.lock().unwrap();
            state.watchers.values().cloned().collect()
        };
        for watcher in watchers {
            watcher(&changed_topics);
        }
    }

    #[cfg(test)]
    pub(crate) fn live_node_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().nodes.keys().cloned().collect()
    }
}

impl LoggingContext for NodeInfoManager {
    fn component(&self) -> Component {
        Component::Discovery
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// Rebuild `service_index` and `publisher_index` from `nodes`, returning
/// the set of topic names whose publisher set changed.
fn rebuild_indices(state: &mut ManagerState) -> HashSet<String> {
    let mut node_ids: Vec<&String> = state.nodes.keys().collect();
    node_ids.sort();

    let mut service_index = HashMap::new();
    for &node_id in &node_ids {
        let info = &state.nodes[node_id];
        for (service_name, &port) in &info.services {
            service_index
                .entry(service_name.clone())
                .or_insert(SocketInfo { ip: info.ip, port });
        }
    }

    let mut publisher_index: HashMap<String, Vec<SocketInfo>> = HashMap::new();
    for &node_id in &node_ids {
        let info = &state.nodes[node_id];
        for (topic_name, socket) in info.topic_sockets() {
            publisher_index.entry(topic_name.clone()).or_default().push(socket);
        }
    }

    let mut changed_topics = HashSet::new();
    let all_topics: HashSet<&String> = state
        .publisher_index
        .keys()
        .chain(publisher_index.keys())
        .collect();
    for topic in all_topics {
        let before = state.publisher_index.get(topic);
        let after = publisher_index.get(topic);
        if before != after {
            changed_topics.insert(topic.clone());
        }
    }

    state.service_index = service_index;
    state.publisher_index = publisher_index;
    changed_topics
}
