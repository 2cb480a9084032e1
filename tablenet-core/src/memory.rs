//! In-process transport fabric for tests and single-host runs.
//!
//! [`MemoryFabric`] wires `size` ranks together through per-rank mailboxes.
//! Delivery happens inside [`Transport::try_send`], so send handles are
//! complete from birth, and each mailbox is a single FIFO, which preserves
//! ordering per `(source, destination)` pair — the same guarantees the
//! engine expects from a real substrate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::message::PeerId;
use crate::transport::{Probe, SendHandle, Transport};

struct Inbound {
    source: PeerId,
    tag: u32,
    payload: Vec<u8>,
}

/// A set of ranks connected through shared in-process mailboxes.
#[derive(Clone)]
pub struct MemoryFabric {
    mailboxes: Arc<Vec<Mutex<VecDeque<Inbound>>>>,
}

impl MemoryFabric {
    /// Create a fabric of `size` ranks.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "fabric needs at least one rank");
        let mailboxes = (0..size).map(|_| Mutex::new(VecDeque::new())).collect();
        Self {
            mailboxes: Arc::new(mailboxes),
        }
    }

    /// Number of ranks in the fabric.
    pub fn size(&self) -> usize {
        self.mailboxes.len()
    }

    /// The transport endpoint for one rank.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is out of range.
    pub fn endpoint(&self, rank: PeerId) -> MemoryTransport {
        assert!(rank < self.size(), "rank {rank} outside fabric");
        MemoryTransport {
            rank,
            mailboxes: Arc::clone(&self.mailboxes),
            finalized: AtomicBool::new(false),
        }
    }

    /// All endpoints in rank order.
    pub fn endpoints(&self) -> Vec<MemoryTransport> {
        (0..self.size()).map(|rank| self.endpoint(rank)).collect()
    }
}

/// One rank's view of a [`MemoryFabric`].
pub struct MemoryTransport {
    rank: PeerId,
    mailboxes: Arc<Vec<Mutex<VecDeque<Inbound>>>>,
    finalized: AtomicBool,
}

/// Send handle for in-process delivery; complete from birth.
pub struct CompletedSend;

impl SendHandle for CompletedSend {
    fn is_complete(&mut self) -> bool {
        true
    }
}

impl Transport for MemoryTransport {
    type Handle = CompletedSend;

    fn rank(&self) -> PeerId {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailboxes.len()
    }

    fn probe(&self) -> Result<Option<Probe>, TransportError> {
        if self.finalized.load(Ordering::Acquire) {
            return Ok(None);
        }
        let mailbox = self.mailboxes[self.rank].lock();
        Ok(mailbox.front().map(|inbound| Probe {
            source: inbound.source,
            tag: inbound.tag,
            len: inbound.payload.len(),
        }))
    }

    fn recv(&self, probe: &Probe) -> Result<Vec<u8>, TransportError> {
        let mut mailbox = self.mailboxes[self.rank].lock();
        let matches = mailbox.front().is_some_and(|inbound| {
            inbound.source == probe.source
                && inbound.tag == probe.tag
                && inbound.payload.len() == probe.len
        });
        if !matches {
            return Err(TransportError::Recv {
                rank: probe.source,
                message: "probed message no longer at head of mailbox".to_string(),
            });
        }
        match mailbox.pop_front() {
            Some(inbound) => Ok(inbound.payload),
            None => Err(TransportError::Recv {
                rank: probe.source,
                message: "mailbox empty".to_string(),
            }),
        }
    }

    fn try_send(
        &self,
        target: PeerId,
        tag: u32,
        payload: &[u8],
    ) -> Result<Self::Handle, TransportError> {
        if self.finalized.load(Ordering::Acquire) {
            return Err(TransportError::Finalized);
        }
        let Some(mailbox) = self.mailboxes.get(target) else {
            return Err(TransportError::Send {
                target,
                message: format!("rank outside fabric of size {}", self.mailboxes.len()),
            });
        };
        mailbox.lock().push_back(Inbound {
            source: self.rank,
            tag,
            payload: payload.to_vec(),
        });
        Ok(CompletedSend)
    }

    fn finalize(&self) {
        self.finalized.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_is_none_on_empty_mailbox() {
        let fabric = MemoryFabric::new(2);
        let endpoint = fabric.endpoint(0);
        assert!(endpoint.probe().expect("probe").is_none());
    }

    #[test]
    fn send_probe_recv_roundtrip() {
        let fabric = MemoryFabric::new(2);
        let sender = fabric.endpoint(0);
        let receiver = fabric.endpoint(1);

        let mut handle = sender.try_send(1, 3, b"payload").expect("send");
        assert!(handle.is_complete());

        let probe = receiver.probe().expect("probe").expect("pending message");
        assert_eq!(probe.source, 0);
        assert_eq!(probe.tag, 3);
        assert_eq!(probe.len, 7);

        let payload = receiver.recv(&probe).expect("recv");
        assert_eq!(payload, b"payload");
        assert!(receiver.probe().expect("probe").is_none());
    }

    #[test]
    fn delivery_order_is_preserved_per_destination() {
        let fabric = MemoryFabric::new(2);
        let sender = fabric.endpoint(0);
        let receiver = fabric.endpoint(1);

        for i in 0..10u8 {
            sender.try_send(1, 0, &[i]).expect("send");
        }
        for i in 0..10u8 {
            let probe = receiver.probe().expect("probe").expect("pending");
            assert_eq!(receiver.recv(&probe).expect("recv"), vec![i]);
        }
    }

    #[test]
    fn recv_rejects_stale_probe() {
        let fabric = MemoryFabric::new(2);
        let sender = fabric.endpoint(0);
        let receiver = fabric.endpoint(1);

        sender.try_send(1, 0, b"first").expect("send");
        let probe = receiver.probe().expect("probe").expect("pending");
        receiver.recv(&probe).expect("recv");

        // The probe now describes a message that was already consumed.
        assert!(matches!(
            receiver.recv(&probe),
            Err(TransportError::Recv { .. })
        ));
    }

    #[test]
    fn send_to_unknown_rank_fails() {
        let fabric = MemoryFabric::new(2);
        let sender = fabric.endpoint(0);
        assert!(matches!(
            sender.try_send(5, 0, b"x"),
            Err(TransportError::Send { target: 5, .. })
        ));
    }

    #[test]
    fn finalize_stops_traffic() {
        let fabric = MemoryFabric::new(2);
        let endpoint = fabric.endpoint(0);
        endpoint.finalize();
        assert!(endpoint.probe().expect("probe").is_none());
        assert!(matches!(
            endpoint.try_send(1, 0, b"x"),
            Err(TransportError::Finalized)
        ));
    }
}
