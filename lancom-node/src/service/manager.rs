// ServiceManager: the reply-socket side of the service plane.

use super::handler::RawHandler;
use super::response::LanComResponse;
use crate::error::{LanComError, Result};
use crate::transport::{bound_port, SocketHandle};
use lancom_common::logging::{Component, Logger, LoggingContext};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

const SOCKET_RECV_TIMEOUT_MS: i32 = 100;

pub struct ServiceManager {
    pub service_port: u16,
    socket: Arc<SocketHandle>,
    handlers: Mutex<HashMap<String, RawHandler>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    logger: Logger,
}

impl ServiceManager {
    /// Bind a reply socket on `tcp://{ip}:0` and record the ephemeral port.
    pub fn bind(ctx: &zmq::Context, ip: IpAddr, logger: Logger) -> Result<Arc<Self>> {
        let raw = ctx
            .socket(zmq::REP)
            .map_err(|e| LanComError::Comm(format!("failed to create REP socket: {e}")))?;
        raw.set_rcvtimeo(SOCKET_RECV_TIMEOUT_MS)
            .map_err(|e| LanComError::Comm(format!("set_rcvtimeo failed: {e}")))?;
        raw.bind(&format!("tcp://{ip}:0"))
            .map_err(|e| LanComError::Comm(format!("REP bind failed: {e}")))?;
        let service_port = bound_port(&raw)?;
        logger.info(format!("bound service reply socket to port {service_port}"));

        Ok(Arc::new(Self {
            service_port,
            socket: Arc::new(SocketHandle::new(raw)),
            handlers: Mutex::new(HashMap::new()),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            logger,
        }))
    }

    /// Register a handler. Duplicate names are last-writer-wins, with a
    /// warning so an accidental overwrite is visible in logs.
    pub fn register_handler(&self, name: impl Into<String>, handler: RawHandler) {
        let name = name.into();
        let mut handlers = self.handlers.lock().unwrap();
        if handlers.insert(name.clone(), handler).is_some() {
            self.logger.warn(format!("service '{name}' re-registered, replacing previous handler"));
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
    }

    fn worker_loop(&self) {
        while !self.stop.load(Ordering::Relaxed) {
            let frames = match self.socket.recv_multipart(0) {
                Ok(frames) => frames,
                Err(zmq::Error::EAGAIN) => continue,
                Err(e) => {
                    self.logger.warn(format!("service recv failed: {e}"));
                    continue;
                }
            };

            if frames.is_empty() {
                self.logger.warn("received empty service request, no name frame");
                continue;
            }
            if frames.len() < 2 {
                self.logger.warn("no payload frame received for service request");
                continue;
            }
            if frames.len() > 2 {
                self.logger.warn("more message frames received than expected for a service request");
            }

            let service_name = String::from_utf8_lossy(&frames[0]).into_owned();
            let payload = &frames[1];
            self.logger.info(format!("handling request for service '{service_name}'"));

            let response = self.dispatch(&service_name, payload);
            self.logger.debug(format!("service '{service_name}' responded {}", response.code));

            if let Err(e) = self
                .socket
                .send_multipart([service_name.as_bytes(), response.payload.as_slice()], 0)
            {
                self.logger.warn(format!("failed to send service response: {e}"));
            }
        }
    }

    /// `code` never crosses the wire (see `service::response` module docs);
    /// it only decides what gets logged and is available to callers that
    /// embed `ServiceManager` directly rather than going through a `Node`.
    fn dispatch(&self, service_name: &str, payload: &[u8]) -> LanComResponse {
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(service_name) {
            None => LanComResponse::fail(),
            Some(f) => match f(payload) {
                Ok(out) => LanComResponse::success(out),
                Err(e) => {
                    self.logger.error(format!("handler '{service_name}' failed: {e}"));
                    LanComResponse::fail()
                }
            },
        }
    }
}

impl LoggingContext for ServiceManager {
    fn component(&self) -> Component {
        Component::Service
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }
}
