//! Pluggable payload encoding.
//!
//! Workers, memory servers, and the coordinator exchange serde-derived
//! schemas (see [`crate::proto`]); the [`PayloadCodec`] trait decides how
//! those schemas become bytes. [`JsonCodec`] is the default. A deployment
//! that needs a denser encoding implements the trait and threads its codec
//! through the engine; the scheduling queues only ever decode the two
//! request schemas to extract keys, so the codec is consulted on the hot
//! path and must be cheap to clone.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Codec failure, split by direction.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A value failed to serialize.
    #[error("encode failed: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Bytes failed to deserialize into the requested schema.
    #[error("decode failed: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Encodes and decodes payload schemas.
///
/// Implementations must be cheap to clone; the engine hands one copy to
/// each of its threads.
pub trait PayloadCodec: Clone + Send + Sync + 'static {
    /// Encode a schema value to payload bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode payload bytes into a schema value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON payload encoding, the default.
///
/// Human-readable on the wire, which makes multi-process traces easy to
/// follow; swap in a binary codec when payload volume matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
