//! Strict per-key FIFO scheduling for synchronous updates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tablenet_core::{key_of, Envelope, PayloadCodec};

use super::{EnqueueError, RequestQueue, SlotTable};

struct SyncSlot {
    fifo: Mutex<VecDeque<Envelope>>,
}

/// Per-key FIFO queue with strict round-robin dispatch.
///
/// Each key gets one FIFO; `next_request` serves one message per key visit
/// and advances, so no key can monopolize the processor while another has
/// traffic waiting. A single call scans the whole slot ring from the
/// cursor and sleeps only between empty passes.
pub struct SyncRequestQueue<C: PayloadCodec> {
    codec: C,
    table: RwLock<SlotTable<SyncSlot>>,
    cursor: AtomicUsize,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl<C: PayloadCodec> SyncRequestQueue<C> {
    /// Create an empty queue. `poll_interval` is the sleep between empty
    /// scan passes.
    pub fn new(codec: C, poll_interval: Duration) -> Self {
        Self {
            codec,
            table: RwLock::new(SlotTable::new()),
            cursor: AtomicUsize::new(0),
            poll_interval,
            closed: AtomicBool::new(false),
        }
    }

    /// Resolve the slot for a key, creating it on first sight.
    fn slot_id(&self, key: &str) -> usize {
        if let Some(id) = self.table.read().position(key) {
            return id;
        }
        let mut table = self.table.write();
        // Another enqueue may have created the slot between the two locks.
        match table.position(key) {
            Some(id) => id,
            None => table.insert(
                key.to_string(),
                SyncSlot {
                    fifo: Mutex::new(VecDeque::new()),
                },
            ),
        }
    }
}

impl<C: PayloadCodec> RequestQueue for SyncRequestQueue<C> {
    fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        let key = key_of(&self.codec, &envelope)?;
        let id = self.slot_id(&key);
        let table = self.table.read();
        table.slot(id).fifo.lock().push_back(envelope);
        Ok(())
    }

    fn next_request(&self) -> Option<Envelope> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            {
                let table = self.table.read();
                let slot_count = table.len();
                if slot_count > 0 {
                    let start = self.cursor.load(Ordering::Relaxed) % slot_count;
                    for offset in 0..slot_count {
                        let id = (start + offset) % slot_count;
                        if let Some(envelope) = table.slot(id).fifo.lock().pop_front() {
                            self.cursor.store((id + 1) % slot_count, Ordering::Relaxed);
                            return Some(envelope);
                        }
                    }
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tablenet_core::{JsonCodec, MessageKind, PutRequest};

    use super::*;

    const TICK: Duration = Duration::from_micros(100);

    fn put(key: &str, marker: u32) -> Envelope {
        let payload = JsonCodec
            .encode(&PutRequest {
                key: key.to_string(),
                shard: marker,
                value: Vec::new(),
            })
            .expect("encode");
        Envelope::new(MessageKind::PutRequest, payload)
    }

    fn key_and_marker(envelope: &Envelope) -> (String, u32) {
        let request: PutRequest = JsonCodec.decode(&envelope.payload).expect("decode");
        (request.key, request.shard)
    }

    #[test]
    fn round_robin_across_two_keys() {
        let queue = SyncRequestQueue::new(JsonCodec, TICK);
        queue.enqueue(put("a", 0)).expect("enqueue");
        queue.enqueue(put("a", 1)).expect("enqueue");
        queue.enqueue(put("b", 2)).expect("enqueue");

        let order: Vec<_> = (0..3)
            .map(|_| key_and_marker(&queue.next_request().expect("envelope")))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 2),
                ("a".to_string(), 1),
            ]
        );
    }

    #[test]
    fn fifo_preserved_within_a_key() {
        let queue = SyncRequestQueue::new(JsonCodec, TICK);
        for marker in 0..8 {
            queue.enqueue(put("w", marker)).expect("enqueue");
        }
        for marker in 0..8 {
            let envelope = queue.next_request().expect("envelope");
            assert_eq!(key_and_marker(&envelope).1, marker);
        }
    }

    #[test]
    fn every_nonempty_key_served_between_repeats() {
        let queue = SyncRequestQueue::new(JsonCodec, TICK);
        let keys = ["a", "b", "c"];
        for round in 0..3u32 {
            for key in keys {
                queue.enqueue(put(key, round)).expect("enqueue");
            }
        }

        let mut seen_since_last: Vec<String> = Vec::new();
        for _ in 0..9 {
            let (key, _) = key_and_marker(&queue.next_request().expect("envelope"));
            if let Some(previous) = seen_since_last.iter().position(|k| k == &key) {
                // Every other key must have appeared since the last visit.
                assert_eq!(seen_since_last.len() - previous, keys.len());
                seen_since_last.drain(..=previous);
            }
            seen_since_last.push(key);
        }
    }

    #[test]
    fn wraps_past_the_end_of_the_ring_within_one_call() {
        let queue = SyncRequestQueue::new(JsonCodec, TICK);
        queue.enqueue(put("b", 0)).expect("enqueue");
        queue.enqueue(put("a", 1)).expect("enqueue");
        queue.enqueue(put("b", 2)).expect("enqueue");
        // Drain all three; the cursor ends up on "a", which is now empty.
        for _ in 0..3 {
            queue.next_request().expect("envelope");
        }

        // The only traffic sits on "b", behind the cursor; a single call
        // must wrap around and find it.
        queue.enqueue(put("b", 3)).expect("enqueue");
        assert_eq!(
            key_and_marker(&queue.next_request().expect("envelope")),
            ("b".to_string(), 3)
        );
    }

    #[test]
    fn blocks_until_first_enqueue() {
        let queue = Arc::new(SyncRequestQueue::new(JsonCodec, TICK));
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.next_request())
        };
        std::thread::sleep(Duration::from_millis(10));
        queue.enqueue(put("late", 7)).expect("enqueue");

        let envelope = consumer.join().expect("join").expect("envelope");
        assert_eq!(key_and_marker(&envelope), ("late".to_string(), 7));
    }

    #[test]
    fn close_unblocks_consumer() {
        let queue = Arc::new(SyncRequestQueue::new(JsonCodec, TICK));
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.next_request())
        };
        std::thread::sleep(Duration::from_millis(5));
        queue.close();
        assert!(consumer.join().expect("join").is_none());
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let queue = SyncRequestQueue::new(JsonCodec, TICK);
        let result = queue.enqueue(Envelope::new(MessageKind::PutRequest, b"{".to_vec()));
        assert!(matches!(result, Err(EnqueueError::Protocol(_))));
    }
}
