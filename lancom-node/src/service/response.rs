// Response codes and the server-internal response record.
//
// `code` is server-side bookkeeping only; only `payload` ever crosses
// the wire. `ResponseCode` drives what `ServiceManager` does locally
// but is never serialized.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Success,
    Fail,
    InvalidArg,
    Busy,
    Unsupported,
    Timeout,
    CommError,
    InternalError,
}

impl ResponseCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::Success => "SUCCESS",
            ResponseCode::Fail => "FAIL",
            ResponseCode::InvalidArg => "INVALID_ARG",
            ResponseCode::Busy => "BUSY",
            ResponseCode::Unsupported => "UNSUPPORTED",
            ResponseCode::Timeout => "TIMEOUT",
            ResponseCode::CommError => "COMM_ERROR",
            ResponseCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side only; never serialized onto the wire (see module docs).
#[derive(Debug, Clone)]
pub struct LanComResponse {
    pub code: ResponseCode,
    pub payload: Vec<u8>,
}

impl LanComResponse {
    pub fn success(payload: Vec<u8>) -> Self {
        Self {
            code: ResponseCode::Success,
            payload,
        }
    }

    pub fn fail() -> Self {
        Self {
            code: ResponseCode::Fail,
            payload: Vec::new(),
        }
    }
}
