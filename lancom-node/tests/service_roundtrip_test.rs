//! End-to-end service-plane tests: one node advertises and serves a
//! service, a second node discovers it over real UDP multicast beacons
//! and calls it over a real REQ/REP round trip.

use lancom_common::logging::{Component, Logger};
use lancom_node::config::DiscoveryConfig;
use lancom_node::discovery::{LocalNodeInfo, MulticastReceiver, MulticastSender, NodeInfoManager};
use lancom_node::error::LanComError;
use lancom_node::service::{self, handler, ServiceManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

fn fast_discovery_config(port: u16) -> DiscoveryConfig {
    DiscoveryConfig {
        multicast_group: Ipv4Addr::new(224, 0, 0, 1),
        multicast_port: port,
        beacon_period: Duration::from_millis(100),
        liveness_multiplier: 3,
    }
}

#[test]
fn service_call_succeeds_after_discovery() {
    let _ = env_logger::try_init();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let cfg = fast_discovery_config(47901);

    // Node A: serves "echo".
    let local_a = Arc::new(LocalNodeInfo::new("node-a", loopback));
    let ctx_a = zmq::Context::new();
    let service_manager = ServiceManager::bind(&ctx_a, loopback, Logger::new_root(Component::Service, "node-a")).unwrap();
    service_manager.register_handler("echo", handler::req_resp(|req: String| Ok(format!("Echo: {req}"))));
    local_a.register_service("echo", service_manager.service_port);
    service_manager.start();
    let _sender_a = MulticastSender::start(cfg.clone(), local_a.clone(), Logger::new_root(Component::Discovery, "node-a")).unwrap();

    // Node B: resolves "echo" through its own directory.
    let directory_b = Arc::new(NodeInfoManager::new(Logger::new_root(Component::Discovery, "node-b")));
    let _receiver_b = MulticastReceiver::start(
        cfg,
        "node-b-id".to_string(),
        directory_b.clone(),
        Logger::new_root(Component::Discovery, "node-b"),
    )
    .unwrap();

    assert!(
        service::wait_for_service(&directory_b, "echo", Duration::from_secs(3), Duration::from_millis(50)),
        "node B never discovered node A's 'echo' service"
    );

    let ctx_b = zmq::Context::new();
    let result: String = service::request(
        &ctx_b,
        &directory_b,
        "echo",
        Some("hello".to_string()),
        Some(2000),
        &Logger::new_root(Component::Service, "node-b"),
    )
    .unwrap();
    assert_eq!(result, "Echo: hello");

    service_manager.stop();
}

#[test]
fn service_call_against_unknown_service_fails_fast() {
    let _ = env_logger::try_init();
    let directory = Arc::new(NodeInfoManager::new(Logger::new_root(Component::Discovery, "lonely")));
    let ctx = zmq::Context::new();

    let err = service::request::<String, String>(
        &ctx,
        &directory,
        "does-not-exist",
        Some("hi".to_string()),
        Some(200),
        &Logger::new_root(Component::Service, "lonely"),
    )
    .unwrap_err();

    assert!(matches!(err, LanComError::ServiceUnavailable(name) if name == "does-not-exist"));
}

#[test]
fn two_advertisers_resolve_to_the_lexicographically_smallest_node_id() {
    let _ = env_logger::try_init();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let cfg = fast_discovery_config(47902);

    let directory = Arc::new(NodeInfoManager::new(Logger::new_root(Component::Discovery, "observer")));
    let _receiver = MulticastReceiver::start(
        cfg.clone(),
        "observer-id".to_string(),
        directory.clone(),
        Logger::new_root(Component::Discovery, "observer"),
    )
    .unwrap();

    // Two independent advertisers of the same service name; only the
    // randomly-assigned UUID node IDs decide the winner.
    let ctx_1 = zmq::Context::new();
    let local_1 = Arc::new(LocalNodeInfo::new("contender-1", loopback));
    let service_1 = ServiceManager::bind(&ctx_1, loopback, Logger::new_root(Component::Service, "contender-1")).unwrap();
    service_1.register_handler("shared", handler::void(|| Ok(())));
    local_1.register_service("shared", service_1.service_port);
    service_1.start();
    let _sender_1 = MulticastSender::start(cfg.clone(), local_1.clone(), Logger::new_root(Component::Discovery, "contender-1")).unwrap();

    let ctx_2 = zmq::Context::new();
    let local_2 = Arc::new(LocalNodeInfo::new("contender-2", loopback));
    let service_2 = ServiceManager::bind(&ctx_2, loopback, Logger::new_root(Component::Service, "contender-2")).unwrap();
    service_2.register_handler("shared", handler::void(|| Ok(())));
    local_2.register_service("shared", service_2.service_port);
    service_2.start();
    let _sender_2 = MulticastSender::start(cfg, local_2.clone(), Logger::new_root(Component::Discovery, "contender-2")).unwrap();

    assert!(service::wait_for_service(&directory, "shared", Duration::from_secs(3), Duration::from_millis(50)));
    std::thread::sleep(Duration::from_millis(300));

    let winner_port = directory.get_service_info("shared").unwrap().port;
    let expected_port = if local_1.node_id() < local_2.node_id() {
        service_1.service_port
    } else {
        service_2.service_port
    };
    assert_eq!(winner_port, expected_port);

    service_1.stop();
    service_2.stop();
}

/// A handler that returns `Err` must produce a client-visible failure
/// without taking the reply loop down: a later call to the same service
/// still has to succeed.
#[test]
fn a_handler_error_fails_the_call_but_the_service_survives() {
    let _ = env_logger::try_init();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let cfg = fast_discovery_config(47903);

    let local_a = Arc::new(LocalNodeInfo::new("node-a", loopback));
    let ctx_a = zmq::Context::new();
    let service_manager = ServiceManager::bind(&ctx_a, loopback, Logger::new_root(Component::Service, "node-a")).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    service_manager.register_handler(
        "flaky",
        handler::req_resp(move |req: String| {
            calls2.fetch_add(1, Ordering::SeqCst);
            if req == "boom" {
                Err(LanComError::Internal("handler exploded".to_string()))
            } else {
                Ok(format!("Echo: {req}"))
            }
        }),
    );
    local_a.register_service("flaky", service_manager.service_port);
    service_manager.start();
    let _sender_a = MulticastSender::start(cfg.clone(), local_a.clone(), Logger::new_root(Component::Discovery, "node-a")).unwrap();

    let directory_b = Arc::new(NodeInfoManager::new(Logger::new_root(Component::Discovery, "node-b")));
    let _receiver_b = MulticastReceiver::start(
        cfg,
        "node-b-id".to_string(),
        directory_b.clone(),
        Logger::new_root(Component::Discovery, "node-b"),
    )
    .unwrap();

    assert!(service::wait_for_service(&directory_b, "flaky", Duration::from_secs(3), Duration::from_millis(50)));

    let ctx_b = zmq::Context::new();
    let logger_b = Logger::new_root(Component::Service, "node-b");

    // The failing call: the handler returns `Err`, so the server sends an
    // empty payload back (see `service::response`), which fails to decode
    // as a non-empty `String` on the client side.
    let failure = service::request::<String, String>(
        &ctx_b,
        &directory_b,
        "flaky",
        Some("boom".to_string()),
        Some(2000),
        &logger_b,
    );
    assert!(failure.is_err(), "a handler error must surface as a client-visible failure");

    // The reply loop must still be alive and serving the same handler.
    let recovered: String = service::request(
        &ctx_b,
        &directory_b,
        "flaky",
        Some("hello".to_string()),
        Some(2000),
        &logger_b,
    )
    .unwrap();
    assert_eq!(recovered, "Echo: hello");
    assert_eq!(calls.load(Ordering::SeqCst), 2, "both calls must have reached the handler");

    service_manager.stop();
}
