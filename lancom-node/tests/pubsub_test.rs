//! End-to-end topic mesh tests: a subscriber receives messages from a
//! publisher discovered over multicast, and dynamically reconnects when
//! a second publisher of the same topic appears later.

use lancom_common::logging::{Component, Logger};
use lancom_node::config::DiscoveryConfig;
use lancom_node::discovery::{LocalNodeInfo, MulticastReceiver, MulticastSender, NodeInfoManager};
use lancom_node::pubsub::{Publisher, SubscriberManager};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn fast_discovery_config(port: u16) -> DiscoveryConfig {
    DiscoveryConfig {
        multicast_group: Ipv4Addr::new(224, 0, 0, 1),
        multicast_port: port,
        beacon_period: Duration::from_millis(80),
        liveness_multiplier: 3,
    }
}

fn wait_until(max_wait: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + max_wait;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(30));
    }
    condition()
}

#[test]
fn subscriber_receives_messages_from_a_discovered_publisher() {
    let _ = env_logger::try_init();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let cfg = fast_discovery_config(47920);
    let logger = Logger::new_root(Component::PubSub, "test");

    let local_pub = Arc::new(LocalNodeInfo::new("publisher-node", loopback));
    let ctx_pub = zmq::Context::new();
    let publisher: Publisher<String> = Publisher::new(&ctx_pub, "updates", local_pub.clone(), false, logger.clone()).unwrap();
    let _sender = MulticastSender::start(cfg.clone(), local_pub.clone(), logger.clone()).unwrap();

    let directory = Arc::new(NodeInfoManager::new(logger.clone()));
    let _receiver = MulticastReceiver::start(cfg, "subscriber-node-id".to_string(), directory.clone(), logger.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(3), || !directory.get_publisher_info("updates").is_empty()));

    let ctx_sub = zmq::Context::new();
    let subscriber_manager = SubscriberManager::new(ctx_sub, directory.clone(), logger.clone());
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = received.clone();
    subscriber_manager.register::<String, _>("updates", move |msg| received2.lock().unwrap().push(msg)).unwrap();
    subscriber_manager.start();

    // PUB/SUB has a "slow joiner" window: keep publishing until the
    // subscriber's connection has actually been established.
    let got_message = wait_until(Duration::from_secs(3), || {
        let _ = publisher.publish(&"hello".to_string());
        !received.lock().unwrap().is_empty()
    });
    assert!(got_message, "subscriber never received a message from the publisher");
    assert!(received.lock().unwrap().contains(&"hello".to_string()));

    subscriber_manager.stop();
}

#[test]
fn subscriber_reconnects_when_a_second_publisher_joins() {
    let _ = env_logger::try_init();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let cfg = fast_discovery_config(47921);
    let logger = Logger::new_root(Component::PubSub, "test");

    let local_pub_1 = Arc::new(LocalNodeInfo::new("publisher-1", loopback));
    let ctx_pub_1 = zmq::Context::new();
    let publisher_1: Publisher<String> = Publisher::new(&ctx_pub_1, "broadcast", local_pub_1.clone(), false, logger.clone()).unwrap();
    let _sender_1 = MulticastSender::start(cfg.clone(), local_pub_1.clone(), logger.clone()).unwrap();

    let directory = Arc::new(NodeInfoManager::new(logger.clone()));
    let _receiver = MulticastReceiver::start(cfg.clone(), "subscriber-id".to_string(), directory.clone(), logger.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(3), || !directory.get_publisher_info("broadcast").is_empty()));

    let ctx_sub = zmq::Context::new();
    let subscriber_manager = SubscriberManager::new(ctx_sub, directory.clone(), logger.clone());
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = received.clone();
    subscriber_manager
        .register::<String, _>("broadcast", move |msg| received2.lock().unwrap().push(msg))
        .unwrap();
    subscriber_manager.start();

    assert!(wait_until(Duration::from_secs(3), || {
        let _ = publisher_1.publish(&"from-one".to_string());
        received.lock().unwrap().contains(&"from-one".to_string())
    }));

    // A second publisher of the same topic joins after the subscription
    // already exists; the directory watcher must drive a reconnect.
    let local_pub_2 = Arc::new(LocalNodeInfo::new("publisher-2", loopback));
    let ctx_pub_2 = zmq::Context::new();
    let publisher_2: Publisher<String> = Publisher::new(&ctx_pub_2, "broadcast", local_pub_2.clone(), false, logger.clone()).unwrap();
    let _sender_2 = MulticastSender::start(cfg, local_pub_2.clone(), logger.clone()).unwrap();

    assert!(wait_until(Duration::from_secs(3), || directory.get_publisher_info("broadcast").len() >= 2));

    let got_second = wait_until(Duration::from_secs(3), || {
        let _ = publisher_2.publish(&"from-two".to_string());
        received.lock().unwrap().contains(&"from-two".to_string())
    });
    assert!(got_second, "subscriber never reconnected to the second publisher");

    subscriber_manager.stop();
}

/// A node never sees its own published topics through the directory: its
/// own beacons are dropped by `NodeInfoManager::apply_beacon`'s self-echo
/// filter before they ever reach `publisher_index`. A `SubscriberManager`
/// built on top of that directory therefore cannot discover-and-connect to
/// that node's own `Publisher`, even while it is actively publishing.
#[test]
fn a_node_cannot_self_discover_its_own_published_topic() {
    let _ = env_logger::try_init();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let cfg = fast_discovery_config(47922);
    let logger = Logger::new_root(Component::PubSub, "test");

    let local = Arc::new(LocalNodeInfo::new("solo-node", loopback));
    let ctx_pub = zmq::Context::new();
    let publisher: Publisher<String> = Publisher::new(&ctx_pub, "self-topic", local.clone(), false, logger.clone()).unwrap();
    let _sender = MulticastSender::start(cfg.clone(), local.clone(), logger.clone()).unwrap();

    // Same node_id the beacons carry: this is what a subscriber living in
    // the same process (and so sharing the same `local_node_id`) would see.
    let directory = Arc::new(NodeInfoManager::new(logger.clone()));
    let _receiver = MulticastReceiver::start(cfg, local.node_id().to_string(), directory.clone(), logger.clone()).unwrap();

    // Give the beacon loop several periods to have run; the topic must
    // never appear, unlike the cross-node case in the tests above.
    std::thread::sleep(Duration::from_millis(500));
    assert!(directory.get_publisher_info("self-topic").is_empty());

    let ctx_sub = zmq::Context::new();
    let subscriber_manager = SubscriberManager::new(ctx_sub, directory.clone(), logger.clone());
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = received.clone();
    subscriber_manager
        .register::<String, _>("self-topic", move |msg| received2.lock().unwrap().push(msg))
        .unwrap();
    subscriber_manager.start();

    let never_arrived = !wait_until(Duration::from_millis(800), || {
        let _ = publisher.publish(&"echo".to_string());
        !received.lock().unwrap().is_empty()
    });
    assert!(never_arrived, "a node must not receive its own published messages via the directory-driven topic mesh");

    subscriber_manager.stop();
}
