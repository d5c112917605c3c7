// Node: the composition root.
//
// A process hosts exactly one node, so construction is gated behind a
// process-wide singleton rather than left to caller discipline.
// `OnceLock` gives us race-free first-writer-wins semantics; the extra
// `INIT_LOCK` avoids racing two full `build()` calls (each of which
// binds sockets and spawns threads) against each other, since `OnceLock`
// alone only protects the final `set`, not the work that produces the
// value.

use crate::config::NodeConfig;
use crate::discovery::{LocalNodeInfo, MulticastReceiver, MulticastSender, NodeInfoManager};
use crate::error::{LanComError, Result};
use crate::pubsub::{Publisher, SubscriberManager};
use crate::service::{self, handler, RawHandler, ServiceManager};
use lancom_common::logging::{Component, Logger};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

static NODE: OnceLock<Arc<Node>> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

pub struct Node {
    ctx: zmq::Context,
    config: NodeConfig,
    local: Arc<LocalNodeInfo>,
    directory: Arc<NodeInfoManager>,
    service_manager: Arc<ServiceManager>,
    subscriber_manager: Arc<SubscriberManager>,
    sender: Mutex<Option<MulticastSender>>,
    receiver: Mutex<Option<MulticastReceiver>>,
    logger: Logger,
    stopped: AtomicBool,
}

impl Node {
    /// Build and start the process-wide node on first call; later calls
    /// return the already-running instance and ignore `config`.
    pub fn init(config: NodeConfig) -> Result<Arc<Node>> {
        if let Some(existing) = NODE.get() {
            return Ok(existing.clone());
        }
        let _guard = INIT_LOCK.lock().unwrap();
        if let Some(existing) = NODE.get() {
            return Ok(existing.clone());
        }
        let node = Arc::new(Self::build(config)?);
        let _ = NODE.set(node.clone());
        Ok(node)
    }

    pub fn instance() -> Result<Arc<Node>> {
        NODE.get().cloned().ok_or(LanComError::NotInitialized)
    }

    fn build(config: NodeConfig) -> Result<Self> {
        let logger = Logger::new_root(Component::Node, config.name.clone());

        let local = Arc::new(LocalNodeInfo::new(config.name.clone(), config.ip));
        let directory = Arc::new(NodeInfoManager::new(logger.with_scope("directory")));
        let ctx = zmq::Context::new();

        let service_manager = ServiceManager::bind(&ctx, config.ip, logger.with_scope("service"))?;
        local.set_service_port(service_manager.service_port);

        let subscriber_manager = SubscriberManager::new(ctx.clone(), directory.clone(), logger.with_scope("pubsub"));

        let sender = MulticastSender::start(config.discovery.clone(), local.clone(), logger.with_scope("beacon-tx"))?;
        let receiver = MulticastReceiver::start(
            config.discovery.clone(),
            local.node_id().to_string(),
            directory.clone(),
            logger.with_scope("beacon-rx"),
        )?;

        service_manager.start();
        subscriber_manager.start();

        logger.info(format!(
            "node '{}' started: node_id={}, ip={}, service_port={}",
            config.name,
            local.node_id(),
            config.ip,
            service_manager.service_port,
        ));

        Ok(Self {
            ctx,
            config,
            local,
            directory,
            service_manager,
            subscriber_manager,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            logger,
            stopped: AtomicBool::new(false),
        })
    }

    /// Tear down in the reverse of start order: subscriber poll loop,
    /// service reply loop, beacon receiver, beacon sender.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.subscriber_manager.stop();
        self.service_manager.stop();
        if let Some(mut receiver) = self.receiver.lock().unwrap().take() {
            receiver.stop();
        }
        if let Some(mut sender) = self.sender.lock().unwrap().take() {
            sender.stop();
        }
        self.logger.info("node stopped");
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn ip(&self) -> IpAddr {
        self.config.ip
    }

    pub fn node_id(&self) -> &str {
        self.local.node_id()
    }

    /// Register a raw `(bytes) -> Result<bytes>` handler and advertise it
    /// in the next beacon. Prefer the typed `register_*` wrappers below.
    pub fn register_service_handler(&self, name: impl Into<String>, raw: RawHandler) {
        let name = name.into();
        self.service_manager.register_handler(name.clone(), raw);
        self.local.register_service(name, self.service_manager.service_port);
    }

    /// `Resp(Req)`
    pub fn register_request_handler<Req, Resp, F>(&self, name: impl Into<String>, f: F)
    where
        Req: DeserializeOwned,
        Resp: Serialize,
        F: Fn(Req) -> Result<Resp> + Send + Sync + 'static,
    {
        self.register_service_handler(name, handler::req_resp(f));
    }

    /// `void(Req)`
    pub fn register_notification_handler<Req, F>(&self, name: impl Into<String>, f: F)
    where
        Req: DeserializeOwned,
        F: Fn(Req) -> Result<()> + Send + Sync + 'static,
    {
        self.register_service_handler(name, handler::req_void(f));
    }

    /// `Resp()`
    pub fn register_query_handler<Resp, F>(&self, name: impl Into<String>, f: F)
    where
        Resp: Serialize,
        F: Fn() -> Result<Resp> + Send + Sync + 'static,
    {
        self.register_service_handler(name, handler::resp(f));
    }

    /// `void()`
    pub fn register_action_handler<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.register_service_handler(name, handler::void(f));
    }

    pub fn request<Req, Resp>(&self, service_name: &str, payload: Option<Req>, timeout_ms: Option<i32>) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        service::request(&self.ctx, &self.directory, service_name, payload, timeout_ms, &self.logger)
    }

    pub fn wait_for_service(&self, service_name: &str, max_wait: Duration, poll_interval: Duration) -> bool {
        service::wait_for_service(&self.directory, service_name, max_wait, poll_interval)
    }

    /// Create a publisher for `topic`. `local_only` prefixes the topic
    /// name with the `lc.local.` convention.
    pub fn publisher<T: Serialize>(&self, topic: impl Into<String>, local_only: bool) -> Result<Publisher<T>> {
        Publisher::new(&self.ctx, topic, self.local.clone(), local_only, self.logger.with_scope("publisher"))
    }

    pub fn subscribe<T, F>(&self, topic: impl Into<String>, callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscriber_manager.register(topic, callback)
    }

    pub fn sleep(ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}
