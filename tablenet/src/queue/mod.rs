//! Request-scheduling queues.
//!
//! Inbound put and get requests are not dispatched in arrival order:
//! they are serialized per parameter key so that at most one request per
//! key is being handled at a time, with keys serviced round-robin. Two
//! disciplines exist, selected once at engine startup:
//!
//! - [`SyncRequestQueue`]: one FIFO per key, strict round-robin, one
//!   message per key visit. Matches the synchronous update model where
//!   every worker's delta is applied in arrival order.
//! - [`AsyncRequestQueue`]: two FIFOs per key (a put lane and a get lane);
//!   within one key visit the current lane is drained up to the number of
//!   memory-server peers before the lanes switch. Matches the staleness
//!   model of asynchronous updates, where each memory server alternates
//!   between publishing reads and absorbing writes.
//!
//! Both queues assign each key a stable slot on first sight; slots index
//! per-key state and are never reclaimed.

pub mod lanes;
pub mod sync;

use std::collections::HashMap;

use tablenet_core::{ConfigError, Envelope, ProtocolError};

pub use lanes::AsyncRequestQueue;
pub use sync::SyncRequestQueue;

/// Why an envelope could not be enqueued.
///
/// Both variants are fatal at the engine boundary; they are surfaced as
/// values so the scheduling invariants stay unit testable.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// The payload failed to decode far enough to extract a key.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lane exceeded its occupancy bound.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A per-key scheduling queue sitting between the transceiver and the
/// processor.
pub trait RequestQueue: Send + Sync {
    /// Append a request envelope to the slot of its key, creating the slot
    /// on first sight.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Protocol`] when the payload does not yield a key;
    /// [`EnqueueError::Config`] when a lane bound is violated.
    fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError>;

    /// Block until the discipline yields the next envelope.
    ///
    /// Returns `None` only after [`RequestQueue::close`]; messages still
    /// queued at that point are discarded.
    fn next_request(&self) -> Option<Envelope>;

    /// Wake any blocked consumer and make subsequent `next_request` calls
    /// return `None`.
    fn close(&self);
}

/// Key-to-slot index plus the growable slot vector, guarded together by
/// each queue's structural lock.
pub(crate) struct SlotTable<S> {
    index: HashMap<String, usize>,
    slots: Vec<S>,
}

impl<S> SlotTable<S> {
    pub(crate) fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
        }
    }

    pub(crate) fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Insert a slot for a key not yet present. Slot ids are assigned
    /// densely and never change.
    pub(crate) fn insert(&mut self, key: String, slot: S) -> usize {
        let id = self.slots.len();
        self.slots.push(slot);
        self.index.insert(key, id);
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, id: usize) -> &S {
        &self.slots[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_ids_are_dense_and_stable() {
        let mut table: SlotTable<u8> = SlotTable::new();
        assert_eq!(table.insert("a".to_string(), 0), 0);
        assert_eq!(table.insert("b".to_string(), 0), 1);
        assert_eq!(table.position("a"), Some(0));
        assert_eq!(table.position("b"), Some(1));
        assert_eq!(table.position("c"), None);
        assert_eq!(table.len(), 2);
    }
}
