// Transport primitives: message sockets.
//
// `zmq` provides a reliable bidirectional message stream with
// multi-frame send/receive and a nonblocking poll (REQ/REP), plus a
// fan-out stream (PUB/SUB). UDP multicast for the beacon lives in
// `discovery::multicast` instead, built on `socket2`.

use crate::error::{LanComError, Result};
use std::ops::Deref;

/// A `zmq::Socket` is not `Sync`, and the crate leaves `Send` unspecified
/// for its raw-pointer-backed type. Every socket we hand out here is only
/// ever touched by a single owning thread at a time (the service loop
/// owns its REP socket, the poll loop owns all SUB sockets, a client call
/// owns its REQ socket for the duration of that call); handles only cross
/// threads via `Arc` for lifetime bookkeeping, never for concurrent calls.
pub struct SocketHandle(zmq::Socket);

unsafe impl Send for SocketHandle {}
unsafe impl Sync for SocketHandle {}

impl SocketHandle {
    pub fn new(socket: zmq::Socket) -> Self {
        Self(socket)
    }
}

impl Deref for SocketHandle {
    type Target = zmq::Socket;

    fn deref(&self) -> &zmq::Socket {
        &self.0
    }
}

/// Parse the ephemeral port a socket was bound to out of its last
/// endpoint string (`tcp://1.2.3.4:54321`).
pub fn bound_port(socket: &zmq::Socket) -> Result<u16> {
    let endpoint = socket
        .get_last_endpoint()
        .map_err(|e| LanComError::Comm(format!("get_last_endpoint failed: {e}")))?
        .map_err(|raw| {
            LanComError::Comm(format!(
                "last endpoint is not valid utf-8: {:?}",
                String::from_utf8_lossy(&raw)
            ))
        })?;
    endpoint
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| LanComError::Comm(format!("could not parse port from endpoint '{endpoint}'")))
}
