//! Message tags and the envelope unit moved between queues.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Rank of a peer process within the fabric.
///
/// Ranks are dense integers `0..size`. The highest rank is the coordinator
/// and is excluded from broadcasts.
pub type PeerId = usize;

/// Closed enumeration of message tags.
///
/// Every message on the wire carries exactly one of these tags. The
/// enumeration is bounded by [`MessageKind::COUNT`], which sizes the
/// per-kind tables in the response pool and the callback and handler
/// registries.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Install or merge a value for a key. Scheduled through the request queue.
    PutRequest = 0,
    /// Read a value for a key. Scheduled through the request queue.
    GetRequest = 1,
    /// Reply to a [`MessageKind::PutRequest`]. Delivered via the response pool.
    PutResponse = 2,
    /// Reply to a [`MessageKind::GetRequest`]. Delivered via the response pool.
    GetResponse = 3,
    /// Coordinator announcement of shard placement.
    ShardAssignment = 4,
    /// Worker announcing itself to the coordinator.
    RegisterWorker = 5,
    /// Coordinator telling a worker to stop.
    WorkerShutdown = 6,
    /// Acknowledgment tag used to join broadcasts.
    Ack = 7,
}

impl MessageKind {
    /// Number of distinct tags; the compile-time bound for per-kind tables.
    pub const COUNT: usize = 8;

    /// All tags in ascending wire order.
    pub const ALL: [MessageKind; MessageKind::COUNT] = [
        MessageKind::PutRequest,
        MessageKind::GetRequest,
        MessageKind::PutResponse,
        MessageKind::GetResponse,
        MessageKind::ShardAssignment,
        MessageKind::RegisterWorker,
        MessageKind::WorkerShutdown,
        MessageKind::Ack,
    ];

    /// The raw wire tag for this kind.
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Index into per-kind tables. Always `< COUNT`.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether this kind is scheduled through the request queue rather than
    /// the response pool.
    pub const fn is_request(self) -> bool {
        matches!(self, MessageKind::PutRequest | MessageKind::GetRequest)
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = ProtocolError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        MessageKind::ALL
            .get(tag as usize)
            .copied()
            .ok_or(ProtocolError::UnknownTag { tag })
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageKind::PutRequest => "put-request",
            MessageKind::GetRequest => "get-request",
            MessageKind::PutResponse => "put-response",
            MessageKind::GetResponse => "get-response",
            MessageKind::ShardAssignment => "shard-assignment",
            MessageKind::RegisterWorker => "register-worker",
            MessageKind::WorkerShutdown => "worker-shutdown",
            MessageKind::Ack => "ack",
        };
        f.write_str(name)
    }
}

/// A tagged message: the unit moved between the transceiver and the
/// scheduling queues.
///
/// The payload is opaque to everything except key extraction from the two
/// request kinds (see [`crate::proto::key_of`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Tag classifying the payload.
    pub kind: MessageKind,
    /// Encoded payload bytes.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope from a tag and encoded payload.
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}
