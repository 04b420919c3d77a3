//! Payload encoding and the schema contract.
//!
//! Encoding (the write path) is fixed to JSON bytes. Decoding plus semantic
//! validation (the read path) is deferred to a [`Schema`] trait object
//! attached to each route: any validation library can implement it, and the
//! engine depends only on that contract. The built-in [`JsonSchema`] only
//! checks that the bytes are well-formed JSON and performs no further
//! validation, a permissive default callers can replace.

use serde::Serialize;

use crate::error::CodecError;

/// Serialize a payload to the bytes stored in the payload map.
pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(payload).map_err(|e| CodecError::Encode(e.to_string()))
}

/// A schema descriptor attached to a route. `validate` is handed the raw
/// payload bytes fetched from the store and must return either the decoded,
/// validated value or a validation error — the dispatch loop does not
/// distinguish malformed bytes from schema mismatches; both end a dispatch
/// attempt the same way (log, release lease, leave the entry for an
/// operator).
pub trait Schema: Send + Sync {
    fn validate(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// The permissive default schema: decodes bytes as JSON and performs no
/// further structural validation. Suitable for routes that trust their own
/// producers, or as a starting point before writing a stricter [`Schema`].
pub struct JsonSchema;

impl Schema for JsonSchema {
    fn validate(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
