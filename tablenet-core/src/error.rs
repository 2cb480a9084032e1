//! Error taxonomy for the networking substrate.
//!
//! Three classes with distinct propagation policies:
//!
//! - [`ConfigError`] and [`ProtocolError`] are fatal. Queue and registry
//!   APIs surface them as `Result` values so the invariants stay unit
//!   testable; the engine escalates any occurrence by logging and aborting
//!   the process. Malformed protocol state has no meaningful local
//!   recovery.
//! - [`TransportError`] is absorbed where it occurs: failed sends stay on
//!   the pending list with an incremented failure count and are retried
//!   transparently.

use crate::codec::CodecError;
use crate::message::{MessageKind, PeerId};

/// Configuration faults. Fatal at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No handler constructor registered under the requested identifier.
    #[error("unknown handler: {id:?}")]
    UnknownHandler {
        /// The identifier that was looked up.
        id: String,
    },

    /// A lane of the asynchronous request queue exceeded its occupancy
    /// bound. Each memory server may have at most one outstanding request
    /// of each kind per key, so this indicates a protocol violation by a
    /// producer.
    #[error("{kind} lane overflow for key {key:?}: {queued} queued, limit {limit}")]
    LaneOverflow {
        /// Kind of the lane that overflowed.
        kind: MessageKind,
        /// Key whose slot overflowed.
        key: String,
        /// Messages already queued in the lane.
        queued: usize,
        /// Per-lane occupancy bound (the number of memory servers).
        limit: usize,
    },
}

/// Protocol faults: bytes that do not match the schema for their tag.
/// Fatal at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The wire tag maps to no [`MessageKind`].
    #[error("unknown message tag {tag}")]
    UnknownTag {
        /// The unrecognized raw tag.
        tag: u32,
    },

    /// The payload failed to decode against the schema for its tag.
    #[error("malformed {kind} payload")]
    MalformedPayload {
        /// Tag the payload arrived under.
        kind: MessageKind,
        /// Decode failure reported by the codec.
        #[source]
        source: CodecError,
    },

    /// Key extraction was attempted on a kind whose schema has no key.
    #[error("{kind} payloads carry no scheduling key")]
    UnkeyedKind {
        /// The keyless kind.
        kind: MessageKind,
    },
}

/// Transport faults reported by the underlying substrate.
///
/// Send faults are absorbed by the transceiver, which retries the record
/// transparently; there is no bounded retry limit here, that policy belongs
/// to the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The non-blocking probe failed.
    #[error("probe failed: {message}")]
    Probe {
        /// Substrate-reported detail.
        message: String,
    },

    /// Receiving a probed message failed.
    #[error("receive from rank {rank} failed: {message}")]
    Recv {
        /// Rank the message was probed from.
        rank: PeerId,
        /// Substrate-reported detail.
        message: String,
    },

    /// Initiating a send failed.
    #[error("send to rank {target} failed: {message}")]
    Send {
        /// Destination rank of the failed send.
        target: PeerId,
        /// Substrate-reported detail.
        message: String,
    },

    /// The transport has been finalized; no further operations are valid.
    #[error("transport finalized")]
    Finalized,
}
