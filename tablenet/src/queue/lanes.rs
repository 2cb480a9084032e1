//! Lane-alternating scheduling for asynchronous updates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tablenet_core::{key_of, ConfigError, Envelope, MessageKind, PayloadCodec, ProtocolError};

use super::{EnqueueError, RequestQueue, SlotTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Put,
    Get,
}

impl Lane {
    fn other(self) -> Lane {
        match self {
            Lane::Put => Lane::Get,
            Lane::Get => Lane::Put,
        }
    }
}

struct LaneState {
    put: VecDeque<Envelope>,
    get: VecDeque<Envelope>,
    /// Messages drained from the current lane since the last switch.
    drained: usize,
    lane: Lane,
    /// Set until the slot's very first message has been drained.
    first_drain: bool,
}

struct LaneSlot {
    state: Mutex<LaneState>,
}

impl LaneSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(LaneState {
                put: VecDeque::new(),
                get: VecDeque::new(),
                drained: 0,
                lane: Lane::Put,
                first_drain: true,
            }),
        }
    }
}

/// Per-key put/get lanes with bounded occupancy and lane alternation.
///
/// Each memory-server peer issues at most one outstanding request of each
/// kind per key, so a lane never holds more than `num_memory_servers`
/// messages; exceeding that bound is a [`ConfigError`].
///
/// Dispatch rotates round-robin across keys. Within a key, the current
/// lane yields up to `num_memory_servers` messages before the lanes
/// switch, with one exception: a fresh slot starts in the put lane and
/// switches to the get lane immediately after its first message drains.
/// The first message installs the key's value; from then on traffic
/// alternates get-burst / put-burst.
///
/// A key's first message must therefore be a put. Gets that arrive before
/// any put sit in the get lane until the installing put has drained.
pub struct AsyncRequestQueue<C: PayloadCodec> {
    codec: C,
    /// Lane occupancy bound and burst length: the memory-server count.
    limit: usize,
    table: RwLock<SlotTable<LaneSlot>>,
    cursor: AtomicUsize,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl<C: PayloadCodec> AsyncRequestQueue<C> {
    /// Create an empty queue for a fabric with `num_memory_servers` memory
    /// servers.
    ///
    /// # Panics
    ///
    /// Panics if `num_memory_servers` is zero.
    pub fn new(codec: C, num_memory_servers: usize, poll_interval: Duration) -> Self {
        assert!(num_memory_servers > 0, "need at least one memory server");
        Self {
            codec,
            limit: num_memory_servers,
            table: RwLock::new(SlotTable::new()),
            cursor: AtomicUsize::new(0),
            poll_interval,
            closed: AtomicBool::new(false),
        }
    }

    fn slot_id(&self, key: &str) -> usize {
        if let Some(id) = self.table.read().position(key) {
            return id;
        }
        let mut table = self.table.write();
        match table.position(key) {
            Some(id) => id,
            None => table.insert(key.to_string(), LaneSlot::new()),
        }
    }
}

impl<C: PayloadCodec> RequestQueue for AsyncRequestQueue<C> {
    fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        let key = key_of(&self.codec, &envelope)?;
        let id = self.slot_id(&key);
        let kind = envelope.kind;

        let table = self.table.read();
        let mut state = table.slot(id).state.lock();
        let lane = match kind {
            MessageKind::PutRequest => &mut state.put,
            MessageKind::GetRequest => &mut state.get,
            // key_of already rejected everything else.
            kind => return Err(ProtocolError::UnkeyedKind { kind }.into()),
        };
        if lane.len() >= self.limit {
            return Err(ConfigError::LaneOverflow {
                kind,
                key,
                queued: lane.len(),
                limit: self.limit,
            }
            .into());
        }
        lane.push_back(envelope);
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
                        let mut state = table.slot(id).state.lock();
                        let popped = match state.lane {
                            Lane::Put => state.put.pop_front(),
                            Lane::Get => state.get.pop_front(),
                        };
                        let Some(envelope) = popped else {
                            // Current lane empty: the burst is not over, so
                            // the other lane must wait. Move to the next key.
                            continue;
                        };
                        state.drained += 1;
                        if state.first_drain {
                            state.lane = Lane::Get;
                            state.drained = 0;
                            state.first_drain = false;
                        } else if state.drained == self.limit {
                            state.lane = state.lane.other();
                            state.drained = 0;
                        }
                        self.cursor.store((id + 1) % slot_count, Ordering::Relaxed);
                        return Some(envelope);
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
