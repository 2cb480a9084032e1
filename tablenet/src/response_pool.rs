//! Per-(kind, source) delivery of non-request messages.
//!
//! Everything the transceiver receives that is not a put or get request
//! lands here, keyed by message kind and sending rank, and is actively
//! polled by whichever caller thread is waiting on it. One lock per kind:
//! readers of put responses never contend with readers of registration
//! acks.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tablenet_core::{MessageKind, PeerId};

type SourceQueues = BTreeMap<PeerId, VecDeque<Vec<u8>>>;

/// FIFO pool of response payloads, one queue per (kind, source) pair.
pub struct ResponsePool {
    kinds: Vec<Mutex<SourceQueues>>,
    closed: AtomicBool,
}

impl Default for ResponsePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsePool {
    /// Create an empty pool covering every message kind.
    pub fn new() -> Self {
        Self {
            kinds: (0..MessageKind::COUNT)
                .map(|_| Mutex::new(BTreeMap::new()))
                .collect(),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver a payload. Called by the transceiver only.
    pub fn push(&self, kind: MessageKind, source: PeerId, payload: Vec<u8>) {
        self.kinds[kind.index()]
            .lock()
            .entry(source)
            .or_default()
            .push_back(payload);
    }

    /// Remove and return the head of the (kind, source) queue, if any.
    pub fn poll(&self, kind: MessageKind, source: PeerId) -> Option<Vec<u8>> {
        self.kinds[kind.index()]
            .lock()
            .get_mut(&source)
            .and_then(VecDeque::pop_front)
    }

    /// Non-blocking read. With `source = None`, sources are scanned in
    /// ascending rank order and the first pending payload wins.
    pub fn try_read(&self, kind: MessageKind, source: Option<PeerId>) -> Option<(Vec<u8>, PeerId)> {
        let mut queues = self.kinds[kind.index()].lock();
        match source {
            Some(rank) => queues
                .get_mut(&rank)
                .and_then(VecDeque::pop_front)
                .map(|payload| (payload, rank)),
            None => queues.iter_mut().find_map(|(&rank, queue)| {
                queue.pop_front().map(|payload| (payload, rank))
            }),
        }
    }

    /// Blocking read with a cooperative sleep between poll attempts.
    ///
    /// Returns `None` only once the pool is closed and the requested queue
    /// is empty.
    pub fn read(
        &self,
        kind: MessageKind,
        source: Option<PeerId>,
        poll_interval: Duration,
    ) -> Option<(Vec<u8>, PeerId)> {
        loop {
            if let Some(found) = self.try_read(kind, source) {
                return Some(found);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            thread::sleep(poll_interval);
        }
    }

    /// Read and discard `count` payloads of `kind` from any source. Used to
    /// join broadcasts. Returns `false` if the pool closed before all
    /// `count` arrived.
    pub fn wait_for_sync(&self, kind: MessageKind, count: usize, poll_interval: Duration) -> bool {
        for _ in 0..count {
            if self.read(kind, None, poll_interval).is_none() {
                return false;
            }
        }
        true
    }

    /// Number of payloads currently pooled for a kind, across all sources.
    pub fn pending(&self, kind: MessageKind) -> usize {
        self.kinds[kind.index()]
            .lock()
            .values()
            .map(VecDeque::len)
            .sum()
    }

    /// Wake blocked readers; subsequent reads drain what is left and then
    /// return `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const TICK: Duration = Duration::from_micros(100);

    #[test]
    fn poll_returns_in_delivery_order() {
        let pool = ResponsePool::new();
        pool.push(MessageKind::PutResponse, 2, b"one".to_vec());
        pool.push(MessageKind::PutResponse, 2, b"two".to_vec());

        assert_eq!(pool.poll(MessageKind::PutResponse, 2), Some(b"one".to_vec()));
        assert_eq!(pool.poll(MessageKind::PutResponse, 2), Some(b"two".to_vec()));
        assert_eq!(pool.poll(MessageKind::PutResponse, 2), None);
    }

    #[test]
    fn kinds_are_isolated() {
        let pool = ResponsePool::new();
        pool.push(MessageKind::PutResponse, 0, b"put".to_vec());

        assert_eq!(pool.poll(MessageKind::GetResponse, 0), None);
        assert_eq!(pool.poll(MessageKind::PutResponse, 0), Some(b"put".to_vec()));
    }

    #[test]
    fn any_source_read_prefers_lowest_rank() {
        let pool = ResponsePool::new();
        pool.push(MessageKind::Ack, 3, b"from-3".to_vec());
        pool.push(MessageKind::Ack, 1, b"from-1".to_vec());

        let (payload, source) = pool.try_read(MessageKind::Ack, None).expect("pending");
        assert_eq!((payload.as_slice(), source), (b"from-1".as_slice(), 1));

        let (payload, source) = pool.try_read(MessageKind::Ack, None).expect("pending");
        assert_eq!((payload.as_slice(), source), (b"from-3".as_slice(), 3));
    }

    #[test]
    fn read_blocks_until_delivery() {
        let pool = Arc::new(ResponsePool::new());
        let reader = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.read(MessageKind::GetResponse, Some(4), TICK))
        };
        thread::sleep(Duration::from_millis(5));
        pool.push(MessageKind::GetResponse, 4, b"late".to_vec());

        let (payload, source) = reader.join().expect("join").expect("payload");
        assert_eq!((payload.as_slice(), source), (b"late".as_slice(), 4));
    }

    #[test]
    fn wait_for_sync_consumes_exactly_count() {
        let pool = ResponsePool::new();
        for rank in 0..3 {
            pool.push(MessageKind::Ack, rank, Vec::new());
        }
        pool.push(MessageKind::Ack, 0, b"extra".to_vec());

        assert!(pool.wait_for_sync(MessageKind::Ack, 3, TICK));
        assert_eq!(pool.pending(MessageKind::Ack), 1);
    }

    #[test]
    fn close_unblocks_empty_reads_but_drains_leftovers() {
        let pool = ResponsePool::new();
        pool.push(MessageKind::Ack, 0, b"leftover".to_vec());
        pool.close();

        assert!(pool.read(MessageKind::Ack, None, TICK).is_some());
        assert!(pool.read(MessageKind::Ack, None, TICK).is_none());
        assert!(!pool.wait_for_sync(MessageKind::Ack, 1, TICK));
    }
}
