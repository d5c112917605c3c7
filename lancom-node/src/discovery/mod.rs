pub mod manager;
pub mod multicast;
pub mod node_info;

pub use manager::{ChangeToken, NodeInfoManager};
pub use multicast::{MulticastReceiver, MulticastSender};
pub use node_info::{Beacon, LocalNodeInfo, RemoteNodeInfo, SocketInfo};
