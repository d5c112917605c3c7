pub mod client;
pub mod handler;
pub mod manager;
pub mod response;

pub use client::{request, wait_for_service};
pub use handler::{req_resp, req_void, resp, void, RawHandler};
pub use manager::ServiceManager;
pub use response::{LanComResponse, ResponseCode};
