// The byte codec external collaborator.
//
// Backed by MessagePack (`rmp-serde`). `to_vec_named`/`from_slice`
// round-trip primitives, strings, byte strings, sequences and
// field-tagged (struct) records without a schema, giving a
// self-describing wire format.

use crate::error::{LanComError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value as a self-describing MessagePack byte string.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| LanComError::Internal(format!("encode failed: {e}")))
}

/// Decode a value previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(|e| LanComError::Internal(format!("decode failed: {e}")))
}
