pub mod publisher;
pub mod subscriber;

pub use publisher::Publisher;
pub use subscriber::SubscriberManager;
