//! Payload schemas exchanged over the substrate.
//!
//! The networking core treats payloads as opaque bytes with one exception:
//! the two request kinds are decoded just far enough to extract the
//! scheduling key ([`key_of`]). Everything else here exists for the code on
//! either side of the wire — workers composing requests and table-server
//! glue composing responses.

use serde::{Deserialize, Serialize};

use crate::codec::PayloadCodec;
use crate::error::ProtocolError;
use crate::message::{Envelope, MessageKind};

/// Read a value for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    /// Key being read.
    pub key: String,
    /// Rank of the requesting worker, so the reply can be addressed.
    pub source: u32,
}

/// Install a first value for a key, or carry a delta for an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    /// Key being written.
    pub key: String,
    /// Shard the key belongs to.
    pub shard: u32,
    /// Codec-encoded table value or delta.
    pub value: Vec<u8>,
}

/// Reply to a [`PutRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResponse {
    /// Key the put targeted.
    pub key: String,
    /// Whether the handler accepted the write.
    pub accepted: bool,
}

/// Reply to a [`GetRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    /// Key that was read.
    pub key: String,
    /// Codec-encoded table value materialized by the handler.
    pub value: Vec<u8>,
}

/// Bodyless message, used as broadcast acknowledgment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Extract the scheduling key from a request envelope.
///
/// Only [`MessageKind::PutRequest`] and [`MessageKind::GetRequest`] carry a
/// key; any other kind is an [`ProtocolError::UnkeyedKind`].
///
/// # Errors
///
/// [`ProtocolError::MalformedPayload`] when the payload does not decode
/// against the schema for its tag.
pub fn key_of<C: PayloadCodec>(codec: &C, envelope: &Envelope) -> Result<String, ProtocolError> {
    match envelope.kind {
        MessageKind::PutRequest => codec
            .decode::<PutRequest>(&envelope.payload)
            .map(|request| request.key)
            .map_err(|source| ProtocolError::MalformedPayload {
                kind: envelope.kind,
                source,
            }),
        MessageKind::GetRequest => codec
            .decode::<GetRequest>(&envelope.payload)
            .map(|request| request.key)
            .map_err(|source| ProtocolError::MalformedPayload {
                kind: envelope.kind,
                source,
            }),
        kind => Err(ProtocolError::UnkeyedKind { kind }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    fn put_envelope(key: &str) -> Envelope {
        let payload = JsonCodec
            .encode(&PutRequest {
                key: key.to_string(),
                shard: 0,
                value: Vec::new(),
            })
            .expect("encode");
        Envelope::new(MessageKind::PutRequest, payload)
    }

    #[test]
    fn key_extracted_from_put() {
        let envelope = put_envelope("fc2-bias");
        assert_eq!(key_of(&JsonCodec, &envelope).expect("key"), "fc2-bias");
    }

    #[test]
    fn key_extracted_from_get() {
        let payload = JsonCodec
            .encode(&GetRequest {
                key: "embeddings".to_string(),
                source: 1,
            })
            .expect("encode");
        let envelope = Envelope::new(MessageKind::GetRequest, payload);
        assert_eq!(key_of(&JsonCodec, &envelope).expect("key"), "embeddings");
    }

    #[test]
    fn malformed_request_payload_is_a_protocol_error() {
        let envelope = Envelope::new(MessageKind::GetRequest, b"{]".to_vec());
        assert!(matches!(
            key_of(&JsonCodec, &envelope),
            Err(ProtocolError::MalformedPayload {
                kind: MessageKind::GetRequest,
                ..
            })
        ));
    }

    #[test]
    fn unkeyed_kinds_are_rejected() {
        let envelope = Envelope::new(MessageKind::Ack, Vec::new());
        assert!(matches!(
            key_of(&JsonCodec, &envelope),
            Err(ProtocolError::UnkeyedKind {
                kind: MessageKind::Ack
            })
        ));
    }
}
