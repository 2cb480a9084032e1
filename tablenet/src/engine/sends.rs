//! Outbound send records and their pending/in-flight lists.

use std::collections::VecDeque;
use std::time::Instant;

use tablenet_core::{MessageKind, PeerId};

/// An outbound message moving through the send pipeline.
///
/// Heap-owned so the transport handle keeps a stable address while the
/// send is in flight. The producer relinquishes ownership when it pushes
/// the record onto the pending list; from promotion onward the record
/// belongs to the transceiver, which destroys it once the transport
/// reports completion.
pub(crate) struct SendRecord<H> {
    pub(crate) target: PeerId,
    pub(crate) kind: MessageKind,
    pub(crate) payload: Vec<u8>,
    /// Present once the send has been handed to the transport.
    pub(crate) handle: Option<H>,
    pub(crate) created: Instant,
    /// Transport rejections absorbed so far.
    pub(crate) failures: u32,
}

impl<H> SendRecord<H> {
    pub(crate) fn new(target: PeerId, kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            target,
            kind,
            payload,
            handle: None,
            created: Instant::now(),
            failures: 0,
        }
    }
}

/// Pending and in-flight sends, guarded together by the engine's send lock.
pub(crate) struct SendState<H> {
    /// Enqueued but not yet handed to the transport. Drained in order, so
    /// sends to a fixed (target, kind) pair initiate in enqueue order.
    pub(crate) pending: VecDeque<SendRecord<H>>,
    /// Handed to the transport, awaiting completion.
    pub(crate) active: Vec<SendRecord<H>>,
}

impl<H> SendState<H> {
    pub(crate) fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            active: Vec::new(),
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }
}
