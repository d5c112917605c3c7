// Error taxonomy for the node runtime, mapped onto the wire response codes.

use crate::service::response::ResponseCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LanComError>;

#[derive(Debug, Error)]
pub enum LanComError {
    #[error("service '{0}' is not available")]
    ServiceUnavailable(String),

    #[error("transport error: {0}")]
    Comm(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("node has not been initialized")]
    NotInitialized,
}

impl LanComError {
    /// The wire-level response code this error maps onto.
    /// `NotInitialized` has no wire representation: it only ever occurs
    /// before any socket is touched.
    pub fn code(&self) -> Option<ResponseCode> {
        match self {
            LanComError::ServiceUnavailable(_) => Some(ResponseCode::CommError),
            LanComError::Comm(_) => Some(ResponseCode::CommError),
            LanComError::Internal(_) => Some(ResponseCode::InternalError),
            LanComError::NotInitialized => None,
        }
    }
}
