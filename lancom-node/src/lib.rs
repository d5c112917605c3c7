pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod node;
pub mod pubsub;
pub mod service;
pub mod transport;

pub use config::{DiscoveryConfig, NodeConfig};
pub use error::{LanComError, Result};
pub use node::Node;
pub use pubsub::{Publisher, SubscriberManager};
pub use service::{LanComResponse, ResponseCode};
