// SubscriberManager: the many-to-many subscribing side of the topic mesh.
//
// Each registered topic owns one SUB socket connected to every publisher
// currently known for that topic. A watcher on `NodeInfoManager` drives
// reconnection: whenever the publisher set for a topic changes, the
// socket's connections are rebuilt to match a full reconnect to the
// current set rather than an incremental diff.
// The poll loop never holds the entries lock while blocked in I/O: it
// snapshots `Arc<SocketHandle>` handles out of the map, releases the
// lock, then polls and receives against the snapshot.

use crate::codec;
use crate::discovery::{ChangeToken, NodeInfoManager, SocketInfo};
use crate::error::{LanComError, Result};
use crate::transport::SocketHandle;
use lancom_common::logging::{Component, Logger, LoggingContext};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_TIMEOUT_MS: i64 = 200;
const POLL_IDLE_INTERVAL: Duration = Duration::from_millis(200);

type Dispatch = Arc<dyn Fn(&[u8]) + Send + Sync>;

struct SubscriberEntry {
    socket: Arc<SocketHandle>,
    connected: HashSet<SocketInfo>,
    dispatch: Dispatch,
}

pub struct SubscriberManager {
    ctx: zmq::Context,
    entries: Mutex<HashMap<String, SubscriberEntry>>,
    directory: Arc<NodeInfoManager>,
    change_token: ChangeToken,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    logger: Logger,
}

impl SubscriberManager {
    pub fn new(ctx: zmq::Context, directory: Arc<NodeInfoManager>, logger: Logger) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let token = directory.subscribe_changes(move |changed| {
                if let Some(this) = weak.upgrade() {
                    this.reconcile(changed);
                }
            });
            Self {
                ctx,
                entries: Mutex::new(HashMap::new()),
                directory,
                change_token: token,
                stop: Arc::new(AtomicBool::new(false)),
                worker: Mutex::new(None),
                logger,
            }
        })
    }

    /// Subscribe to `topic`, decoding every message as `T` and invoking
    /// `callback`. Connects to every publisher the directory currently
    /// knows about; reconnection as the publisher set changes is handled
    /// by [`SubscriberManager::reconcile`].
    pub fn register<T, F>(&self, topic: impl Into<String>, callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let logger = self.logger.clone();
        let topic_for_log = topic.clone();

        let raw = self
            .ctx
            .socket(zmq::SUB)
            .map_err(|e| LanComError::Comm(format!("failed to create SUB socket: {e}")))?;
        raw.set_subscribe(b"")
            .map_err(|e| LanComError::Comm(format!("set_subscribe failed: {e}")))?;

        let publishers = self.directory.get_publisher_info(&topic);
        for socket_info in &publishers {
            raw.connect(&socket_info.to_string())
                .map_err(|e| LanComError::Comm(format!("connect to '{socket_info}' failed: {e}")))?;
        }

        let dispatch: Dispatch = Arc::new(move |bytes: &[u8]| match codec::decode::<T>(bytes) {
            Ok(value) => callback(value),
            Err(e) => logger.warn(format!("failed to decode message on topic '{topic_for_log}': {e}")),
        });

        let entry = SubscriberEntry {
            socket: Arc::new(SocketHandle::new(raw)),
            connected: publishers.into_iter().collect(),
            dispatch,
        };

        let mut entries = self.entries.lock().unwrap();
        if entries.insert(topic.clone(), entry).is_some() {
            self.logger.warn(format!("topic '{topic}' re-registered, replacing previous subscription"));
        }
        Ok(())
    }

    /// Rebuild connections for every topic in `changed_topics` whose
    /// publisher set moved, matching the socket's connections to the
    /// directory's current view.
    fn reconcile(&self, changed_topics: &HashSet<String>) {
        let mut entries = self.entries.lock().unwrap();
        for topic in changed_topics {
            let Some(entry) = entries.get_mut(topic) else {
                continue;
            };
            let desired: HashSet<SocketInfo> = self.directory.get_publisher_info(topic).into_iter().collect();

            for stale in entry.connected.difference(&desired) {
                if let Err(e) = entry.socket.disconnect(&stale.to_string()) {
                    self.logger.warn(format!("disconnect from '{stale}' failed: {e}"));
                }
            }
            for fresh in desired.difference(&entry.connected) {
                if let Err(e) = entry.socket.connect(&fresh.to_string()) {
                    self.logger.warn(format!("connect to '{fresh}' failed: {e}"));
                }
            }
            entry.connected = desired;
            self.logger.info(format!("reconciled subscription to topic '{topic}'"));
        }
    }

    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        let handle = thread::spawn(move || this.worker_loop());
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.directory.unsubscribe(self.change_token);
    }

    fn worker_loop(&self) {
        while !self.stop.load(Ordering::Relaxed) {
            let snapshot: Vec<(Arc<SocketHandle>, Dispatch)> = {
                let entries = self.entries.lock().unwrap();
                entries.values().map(|e| (e.socket.clone(), e.dispatch.clone())).collect()
            };

            if snapshot.is_empty() {
                thread::sleep(POLL_IDLE_INTERVAL);
                continue;
            }

            let mut items: Vec<zmq::PollItem> = snapshot.iter().map(|(s, _)| s.as_poll_item(zmq::POLLIN)).collect();
            if let Err(e) = zmq::poll(&mut items, POLL_TIMEOUT_MS) {
                self.logger.warn(format!("subscriber poll failed: {e}"));
                continue;
            }

            for (i, (socket, dispatch)) in snapshot.iter().enumerate() {
                if !items[i].is_readable() {
                    continue;
                }
                loop {
                    match socket.recv_bytes(zmq::DONTWAIT) {
                        Ok(bytes) => dispatch(&bytes),
                        Err(zmq::Error::EAGAIN) => break,
                        Err(e) => {
                            self.logger.warn(format!("subscriber recv failed: {e}"));
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl LoggingContext for SubscriberManager {
    fn component(&self) -> Component {
        Component::PubSub
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }
}
