// MulticastSender / MulticastReceiver.
//
// Both run on a dedicated OS thread gated by a shared stop flag. The
// receiver's socket uses a short read timeout so it can notice the stop
// flag promptly and so the same thread can drive the liveness sweeper on
// the same cadence.

use super::manager::NodeInfoManager;
use super::node_info::LocalNodeInfo;
use crate::codec;
use crate::config::DiscoveryConfig;
use crate::error::Result;
use lancom_common::logging::Logger;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

fn bind_sender_socket(local_ip: Ipv4Addr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| crate::error::LanComError::Comm(format!("multicast socket create failed: {e}")))?;
    socket
        .bind(&SocketAddr::from(SocketAddrV4::new(local_ip, 0)).into())
        .map_err(|e| crate::error::LanComError::Comm(format!("multicast sender bind failed: {e}")))?;
    socket
        .set_multicast_ttl_v4(4)
        .map_err(|e| crate::error::LanComError::Comm(format!("set_multicast_ttl_v4 failed: {e}")))?;
    Ok(socket.into())
}

fn bind_receiver_socket(group: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| crate::error::LanComError::Comm(format!("multicast socket create failed: {e}")))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| crate::error::LanComError::Comm(format!("set_reuse_address failed: {e}")))?;
    socket
        .bind(&SocketAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).into())
        .map_err(|e| crate::error::LanComError::Comm(format!("multicast receiver bind failed: {e}")))?;
    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .map_err(|e| crate::error::LanComError::Comm(format!("join_multicast_v4 failed: {e}")))?;
    socket
        .set_read_timeout(Some(RECV_TIMEOUT))
        .map_err(|e| crate::error::LanComError::Comm(format!("set_read_timeout failed: {e}")))?;
    Ok(socket.into())
}

/// Periodically snapshots `LocalNodeInfo` and emits a beacon.
pub struct MulticastSender {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MulticastSender {
    pub fn start(config: DiscoveryConfig, local: Arc<LocalNodeInfo>, logger: Logger) -> Result<Self> {
        let local_ip = match local.ip() {
            std::net::IpAddr::V4(v4) => v4,
            std::net::IpAddr::V6(_) => {
                return Err(crate::error::LanComError::Comm(
                    "multicast beacon requires an IPv4 local address".into(),
                ))
            }
        };
        let socket = bind_sender_socket(local_ip)?;
        let target: SocketAddr = SocketAddr::from((config.multicast_group, config.multicast_port));
        let stop = Arc::new(AtomicBool::new(false));
        let stop_loop = stop.clone();

        let handle = thread::spawn(move || {
            while !stop_loop.load(Ordering::Relaxed) {
                let beacon = local.snapshot();
                match codec::encode(&beacon) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, target) {
                            logger.warn(format!("beacon send failed (datagram too large or unreachable?): {e}"));
                        }
                    }
                    Err(e) => logger.warn(format!("beacon encode failed: {e}")),
                }
                thread::sleep(config.beacon_period);
            }
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MulticastSender {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receives beacons on the multicast group and folds them into a
/// `NodeInfoManager`, and runs the liveness sweeper on the same cadence.
pub struct MulticastReceiver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MulticastReceiver {
    pub fn start(
        config: DiscoveryConfig,
        local_node_id: String,
        directory: Arc<NodeInfoManager>,
        logger: Logger,
    ) -> Result<Self> {
        let socket = bind_receiver_socket(config.multicast_group, config.multicast_port)?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_loop = stop.clone();
        let liveness_window = config.liveness_window();
        let sweep_interval = config.beacon_period;

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64 * 1024];
            let mut last_sweep = Instant::now();

            while !stop_loop.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((n, _from)) => match codec::decode::<super::node_info::Beacon>(&buf[..n]) {
                        Ok(beacon) => directory.apply_beacon(&local_node_id, beacon, Instant::now()),
                        Err(e) => logger.warn(format!("dropping undecodable beacon: {e}")),
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => logger.warn(format!("multicast recv failed: {e}")),
                }

                // Checked on the beacon cadence, not the liveness window, so a
                // node that goes silent is evicted within one liveness window
                // of its last beacon rather than up to two.
                let now = Instant::now();
                if now.duration_since(last_sweep) >= sweep_interval {
                    directory.sweep(liveness_window, now);
                    last_sweep = now;
                }
            }
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MulticastReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
