// Publisher<T>: a per-topic object owned by caller code.

use crate::codec;
use crate::discovery::LocalNodeInfo;
use crate::error::{LanComError, Result};
use crate::transport::{bound_port, SocketHandle};
use lancom_common::logging::Logger;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

const LOCAL_NAMESPACE_PREFIX: &str = "lc.local.";

pub struct Publisher<T> {
    topic: String,
    socket: SocketHandle,
    local: Arc<LocalNodeInfo>,
    logger: Logger,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Serialize> Publisher<T> {
    /// Bind a publishing socket on `tcp://{local ip}:0`, capture the
    /// ephemeral port, and register `(topic, port)` with `LocalNodeInfo`
    /// so the next beacon advertises it.
    ///
    /// `local_only` prefixes the topic with `lc.local.`, marking a topic
    /// as not meant for inter-node consumption. The fabric itself does
    /// not special-case the prefix beyond string equality in lookups.
    pub fn new(
        ctx: &zmq::Context,
        topic: impl Into<String>,
        local: Arc<LocalNodeInfo>,
        local_only: bool,
        logger: Logger,
    ) -> Result<Self> {
        let topic = topic.into();
        let full_topic = if local_only {
            format!("{LOCAL_NAMESPACE_PREFIX}{topic}")
        } else {
            topic
        };

        let raw = ctx
            .socket(zmq::PUB)
            .map_err(|e| LanComError::Comm(format!("failed to create PUB socket: {e}")))?;
        raw.bind(&format!("tcp://{}:0", local.ip()))
            .map_err(|e| LanComError::Comm(format!("PUB bind failed: {e}")))?;
        let port = bound_port(&raw)?;

        local.register_topic(full_topic.clone(), port);
        logger.info(format!("publisher for topic '{full_topic}' bound to port {port}"));

        Ok(Self {
            topic: full_topic,
            socket: SocketHandle::new(raw),
            local,
            logger,
            _marker: PhantomData,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode `message` and send it as a single frame. Never blocks the
    /// caller beyond whatever the underlying socket's send buffer offers.
    pub fn publish(&self, message: &T) -> Result<()> {
        let bytes = codec::encode(message)?;
        self.socket
            .send(bytes, zmq::DONTWAIT)
            .map_err(|e| LanComError::Comm(format!("publish on '{}' failed: {e}", self.topic)))
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        self.local.deregister_topic(&self.topic);
        self.logger.info(format!("publisher for topic '{}' torn down", self.topic));
    }
}
