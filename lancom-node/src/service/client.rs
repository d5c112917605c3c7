// Client-side request/response path.

use crate::codec;
use crate::discovery::NodeInfoManager;
use crate::error::{LanComError, Result};
use lancom_common::logging::Logger;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

/// Resolve `service_name` in the directory, perform one request/response
/// round-trip, and decode the reply as `Resp`.
///
/// `timeout_ms` bounds the socket's receive wait; the core itself has no
/// wall-clock timeout requirement, but exposing one lets the caller
/// decide how long to wait.
pub fn request<Req, Resp>(
    ctx: &zmq::Context,
    directory: &NodeInfoManager,
    service_name: &str,
    payload: Option<Req>,
    timeout_ms: Option<i32>,
    logger: &Logger,
) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let target = directory
        .get_service_info(service_name)
        .ok_or_else(|| LanComError::ServiceUnavailable(service_name.to_string()))?;

    let socket = ctx
        .socket(zmq::REQ)
        .map_err(|e| LanComError::Comm(format!("failed to create REQ socket: {e}")))?;
    if let Some(ms) = timeout_ms {
        socket
            .set_rcvtimeo(ms)
            .map_err(|e| LanComError::Comm(format!("set_rcvtimeo failed: {e}")))?;
    }
    socket
        .connect(&target.to_string())
        .map_err(|e| LanComError::Comm(format!("connect to '{target}' failed: {e}")))?;

    let request_bytes = match payload {
        Some(p) => codec::encode(&p)?,
        None => Vec::new(),
    };

    socket
        .send_multipart([service_name.as_bytes(), request_bytes.as_slice()], 0)
        .map_err(|e| LanComError::Comm(format!("send to '{service_name}' failed: {e}")))?;

    let frames = socket
        .recv_multipart(0)
        .map_err(|e| LanComError::Comm(format!("no reply from '{service_name}': {e}")))?;

    if frames.len() < 2 {
        return Err(LanComError::Comm(format!(
            "malformed reply from '{service_name}': expected 2 frames, got {}",
            frames.len()
        )));
    }
    if frames.len() > 2 {
        logger.warn(format!(
            "reply from '{service_name}' carried {} frames, accepting the first two",
            frames.len()
        ));
    }

    codec::decode(&frames[1])
}

/// Poll the directory until `service_name` appears or `max_wait` elapses.
pub fn wait_for_service(directory: &NodeInfoManager, service_name: &str, max_wait: Duration, poll_interval: Duration) -> bool {
    let deadline = Instant::now() + max_wait;
    loop {
        if directory.get_service_info(service_name).is_some() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll_interval);
    }
}
