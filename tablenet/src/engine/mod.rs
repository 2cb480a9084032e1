//! The two-threaded network engine.
//!
//! ```text
//! caller threads          transceiver thread           processor thread
//! ──────────────          ──────────────────           ────────────────
//! send ──► pending ──────► try_send ──► in-flight ──► reaped on completion
//! read ◄── response pool ◄─ route ◄── probe/recv
//!                            │
//!                            └─► request queue ──────► next_request
//!                                                          │
//!                                                      materialize typed
//!                                                      request, dispatch
//!                                                      registered handler
//! ```
//!
//! The transceiver owns all transport traffic: it probes for inbound
//! messages, routes them by kind (requests into the scheduling queue,
//! everything else into the response pool), pushes pending sends through,
//! and reaps completed ones. The processor drains the scheduling queue and
//! invokes the registered request handlers. Both loops poll cooperatively,
//! sleeping the configured interval when idle; there are no condition
//! variables because the transport itself only offers a non-blocking
//! probe.
//!
//! # Lifecycle
//!
//! [`NetworkEngine::init`] starts the threads and owns them;
//! [`EngineHandle`] is the cheaply clonable messaging surface handed to
//! workers and handlers. Dropping the engine shuts it down, so every exit
//! path finalizes the transport exactly once.
//!
//! # Fault policy
//!
//! Transport send failures are absorbed: the record's failure counter is
//! incremented and the send retried until the substrate accepts it.
//! Malformed payloads and scheduling-bound violations have no local
//! recovery; the loops log them and abort the process.

mod config;
mod metrics;
mod sends;

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tablenet_core::{
    Envelope, GetRequest, MessageKind, PayloadCodec, PeerId, ProtocolError, PutRequest,
    SendHandle, Transport,
};

use crate::queue::{AsyncRequestQueue, RequestQueue, SyncRequestQueue};
use crate::response_pool::ResponsePool;
use metrics::EngineMetrics;
use sends::{SendRecord, SendState};

pub use config::EngineConfig;
pub use metrics::MetricsSnapshot;

/// A request materialized from its payload, ready for handler dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// An install-or-merge request.
    Put(PutRequest),
    /// A read request.
    Get(GetRequest),
}

impl Request {
    /// The tag this request arrived under.
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::Put(_) => MessageKind::PutRequest,
            Request::Get(_) => MessageKind::GetRequest,
        }
    }

    /// The parameter key the request targets.
    pub fn key(&self) -> &str {
        match self {
            Request::Put(request) => &request.key,
            Request::Get(request) => &request.key,
        }
    }
}

type CallbackFn = dyn Fn(PeerId, MessageKind) + Send + Sync;
type RequestHandlerFn = dyn Fn(Request) + Send + Sync;

/// Log a fault that has no local recovery and terminate the process.
fn fatal(error: &dyn std::error::Error) -> ! {
    tracing::error!(error = %error, "fatal fault in network engine");
    std::process::abort();
}

struct EngineInner<T: Transport, C: PayloadCodec> {
    transport: T,
    codec: C,
    config: EngineConfig,
    running: AtomicBool,
    queue: Box<dyn RequestQueue>,
    pool: ResponsePool,
    sends: Mutex<SendState<T::Handle>>,
    callbacks: RwLock<Vec<Option<Arc<CallbackFn>>>>,
    handlers: RwLock<Vec<Option<Arc<RequestHandlerFn>>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    metrics: EngineMetrics,
}

/// The owning side of the engine.
///
/// Holds the transceiver and processor threads; dropping it (or calling
/// [`EngineHandle::shutdown`]) stops both and finalizes the transport.
/// Derefs to [`EngineHandle`] for the messaging API.
pub struct NetworkEngine<T: Transport, C: PayloadCodec> {
    handle: EngineHandle<T, C>,
}

/// Cheaply clonable messaging surface of a running engine.
///
/// Hand clones to worker threads and request handlers; they stay valid
/// until the engine shuts down, after which blocking reads return `None`.
pub struct EngineHandle<T: Transport, C: PayloadCodec> {
    inner: Arc<EngineInner<T, C>>,
}

impl<T: Transport, C: PayloadCodec> Clone for EngineHandle<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport, C: PayloadCodec> NetworkEngine<T, C> {
    /// Start the engine: choose the scheduling discipline, then spawn the
    /// transceiver and processor threads.
    pub fn init(transport: T, codec: C, config: EngineConfig) -> Self {
        let queue: Box<dyn RequestQueue> = if config.sync_update {
            Box::new(SyncRequestQueue::new(codec.clone(), config.sleep_time))
        } else {
            Box::new(AsyncRequestQueue::new(
                codec.clone(),
                config.num_memory_servers,
                config.sleep_time,
            ))
        };

        let rank = transport.rank();
        let size = transport.size();
        let inner = Arc::new(EngineInner {
            transport,
            codec,
            config,
            running: AtomicBool::new(true),
            queue,
            pool: ResponsePool::new(),
            sends: Mutex::new(SendState::new()),
            callbacks: RwLock::new(vec![None; MessageKind::COUNT]),
            handlers: RwLock::new(vec![None; MessageKind::COUNT]),
            threads: Mutex::new(Vec::new()),
            metrics: EngineMetrics::default(),
        });

        let transceiver = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("tablenet-transceiver".to_string())
                .spawn(move || inner.transceiver_loop())
        };
        let processor = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("tablenet-processor".to_string())
                .spawn(move || inner.processor_loop())
        };
        {
            let mut threads = inner.threads.lock();
            for spawned in [transceiver, processor] {
                match spawned {
                    Ok(handle) => threads.push(handle),
                    Err(error) => fatal(&error),
                }
            }
        }

        tracing::info!(
            rank,
            size,
            sync_update = inner.config.sync_update,
            "network engine started"
        );
        Self {
            handle: EngineHandle { inner },
        }
    }

    /// A clonable messaging handle onto this engine.
    pub fn handle(&self) -> EngineHandle<T, C> {
        self.handle.clone()
    }
}

impl<T: Transport, C: PayloadCodec> Deref for NetworkEngine<T, C> {
    type Target = EngineHandle<T, C>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<T: Transport, C: PayloadCodec> Drop for NetworkEngine<T, C> {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

impl<T: Transport, C: PayloadCodec> EngineHandle<T, C> {
    /// Rank of this process.
    pub fn rank(&self) -> PeerId {
        self.inner.transport.rank()
    }

    /// Total number of peers, coordinator included.
    pub fn size(&self) -> usize {
        self.inner.transport.size()
    }

    /// Enqueue a message for delivery. Non-blocking; the transceiver
    /// initiates the send and absorbs transport rejections.
    pub fn send<M: Serialize>(&self, target: PeerId, kind: MessageKind, message: &M) {
        match self.inner.codec.encode(message) {
            Ok(payload) => self.send_bytes(target, kind, payload),
            Err(error) => fatal(&error),
        }
    }

    /// Enqueue pre-encoded payload bytes for delivery.
    pub fn send_bytes(&self, target: PeerId, kind: MessageKind, payload: Vec<u8>) {
        let record = SendRecord::new(target, kind, payload);
        self.inner.sends.lock().pending.push_back(record);
    }

    /// Send to every peer except the coordinator (ranks `0..size - 1`).
    pub fn broadcast<M: Serialize>(&self, kind: MessageKind, message: &M) {
        for target in 0..self.size().saturating_sub(1) {
            self.send(target, kind, message);
        }
    }

    /// Broadcast, then block until `size - 1` acknowledgments of
    /// `reply_kind` have been consumed from the response pool.
    ///
    /// Returns `false` if the engine shut down before all replies arrived.
    pub fn sync_broadcast<M: Serialize>(
        &self,
        kind: MessageKind,
        reply_kind: MessageKind,
        message: &M,
    ) -> bool {
        self.broadcast(kind, message);
        self.wait_for_sync(reply_kind, self.size().saturating_sub(1))
    }

    /// Read and discard `count` envelopes of `kind` from any source.
    ///
    /// Returns `false` if the engine shut down before all `count` arrived.
    pub fn wait_for_sync(&self, kind: MessageKind, count: usize) -> bool {
        self.inner
            .pool
            .wait_for_sync(kind, count, self.inner.config.sleep_time)
    }

    /// Block until no sends are pending or in flight.
    pub fn flush(&self) {
        while self.inner.running.load(Ordering::Acquire) {
            if self.inner.sends.lock().is_idle() {
                return;
            }
            thread::sleep(self.inner.config.sleep_time);
        }
    }

    /// Blocking read of the next payload of `kind`. With `source = None`,
    /// sources are scanned in ascending rank order.
    ///
    /// Returns `None` only after shutdown.
    pub fn read(&self, kind: MessageKind, source: Option<PeerId>) -> Option<(Vec<u8>, PeerId)> {
        self.inner
            .pool
            .read(kind, source, self.inner.config.sleep_time)
    }

    /// Non-blocking variant of [`EngineHandle::read`].
    pub fn try_read(&self, kind: MessageKind, source: Option<PeerId>) -> Option<(Vec<u8>, PeerId)> {
        self.inner.pool.try_read(kind, source)
    }

    /// Blocking read decoded into a payload schema.
    pub fn read_as<M: DeserializeOwned>(
        &self,
        kind: MessageKind,
        source: Option<PeerId>,
    ) -> Option<(M, PeerId)> {
        let (payload, from) = self.read(kind, source)?;
        match self.inner.codec.decode(&payload) {
            Ok(message) => Some((message, from)),
            Err(source) => fatal(&ProtocolError::MalformedPayload { kind, source }),
        }
    }

    /// Install a callback fired on the transceiver thread after each
    /// inbound envelope of `kind` has been routed. Used for urgent kinds
    /// like shard assignment; the payload itself is retrieved through the
    /// normal read path.
    pub fn register_callback<F>(&self, kind: MessageKind, callback: F)
    where
        F: Fn(PeerId, MessageKind) + Send + Sync + 'static,
    {
        self.inner.callbacks.write()[kind.index()] = Some(Arc::new(callback));
    }

    /// Install the processor-side dispatch function for a request kind.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not a request kind.
    pub fn register_request_handler<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(Request) + Send + Sync + 'static,
    {
        assert!(
            kind.is_request(),
            "only request kinds are dispatched through the processor"
        );
        self.inner.handlers.write()[kind.index()] = Some(Arc::new(handler));
    }

    /// Current engine counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Stop both loops, close the queues, and finalize the transport.
    /// Idempotent. Outstanding sends are not drained; call
    /// [`EngineHandle::flush`] first when that matters.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!(rank = self.rank(), "network engine shutting down");
        self.inner.queue.close();
        self.inner.pool.close();
        self.inner.transport.finalize();

        let handles: Vec<_> = self.inner.threads.lock().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("engine thread panicked before shutdown");
            }
        }
    }
}

impl<T: Transport, C: PayloadCodec> EngineInner<T, C> {
    fn transceiver_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            let received = self.poll_inbound();
            self.pump_sends();
            self.reap_sends();
            if !received {
                thread::sleep(self.config.sleep_time);
            }
        }
        tracing::debug!(rank = self.transport.rank(), "transceiver stopped");
    }

    /// Receive and route at most one inbound message. Returns whether one
    /// was available.
    fn poll_inbound(&self) -> bool {
        let probe = match self.transport.probe() {
            Ok(Some(probe)) => probe,
            Ok(None) => return false,
            Err(error) => {
                tracing::warn!(error = %error, "inbound probe failed");
                return false;
            }
        };
        let payload = match self.transport.recv(&probe) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(error = %error, "inbound receive failed");
                return false;
            }
        };
        let kind = match MessageKind::try_from(probe.tag) {
            Ok(kind) => kind,
            Err(error) => fatal(&error),
        };
        self.metrics.record_message_received();

        match kind {
            MessageKind::ShardAssignment => {
                tracing::info!(
                    rank = self.transport.rank(),
                    source = probe.source,
                    "received shard assignment"
                );
            }
            MessageKind::WorkerShutdown => {
                tracing::info!(
                    rank = self.transport.rank(),
                    source = probe.source,
                    "received shutdown request"
                );
            }
            _ => {}
        }

        if kind.is_request() {
            if let Err(error) = self.queue.enqueue(Envelope::new(kind, payload)) {
                fatal(&error);
            }
            self.metrics.record_request_enqueued();
        } else {
            self.pool.push(kind, probe.source, payload);
            self.metrics.record_response_pooled();
        }

        let callback = self.callbacks.read()[kind.index()].clone();
        if let Some(callback) = callback {
            callback(probe.source, kind);
        }
        true
    }

    /// Promote pending sends to in-flight, preserving enqueue order. A
    /// rejected send keeps its place at the head of the line so ordering
    /// per (target, kind) survives retries.
    fn pump_sends(&self) {
        let mut sends = self.sends.lock();
        while let Some(mut record) = sends.pending.pop_front() {
            match self
                .transport
                .try_send(record.target, record.kind.tag(), &record.payload)
            {
                Ok(handle) => {
                    record.handle = Some(handle);
                    sends.active.push(record);
                    self.metrics.record_send_initiated();
                }
                Err(error) => {
                    record.failures += 1;
                    self.metrics.record_send_retried();
                    tracing::debug!(
                        peer = record.target,
                        kind = %record.kind,
                        failures = record.failures,
                        error = %error,
                        "send deferred"
                    );
                    sends.pending.push_front(record);
                    break;
                }
            }
        }
    }

    /// Destroy in-flight records whose transport handle reports completion.
    fn reap_sends(&self) {
        let mut sends = self.sends.lock();
        let metrics = &self.metrics;
        sends.active.retain_mut(|record| {
            let complete = record
                .handle
                .as_mut()
                .is_none_or(|handle| handle.is_complete());
            if complete {
                if record.failures > 0 {
                    tracing::info!(
                        peer = record.target,
                        kind = %record.kind,
                        bytes = record.payload.len(),
                        failures = record.failures,
                        elapsed = ?record.created.elapsed(),
                        "send succeeded after retries"
                    );
                }
                metrics.record_send_completed();
            }
            !complete
        });
    }

    fn processor_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            let Some(envelope) = self.queue.next_request() else {
                break;
            };
            self.dispatch_request(envelope);
        }
        tracing::debug!(rank = self.transport.rank(), "processor stopped");
    }

    /// Materialize the typed request and invoke its registered handler.
    fn dispatch_request(&self, envelope: Envelope) {
        let request = match envelope.kind {
            MessageKind::PutRequest => match self.codec.decode::<PutRequest>(&envelope.payload) {
                Ok(request) => Request::Put(request),
                Err(source) => fatal(&ProtocolError::MalformedPayload {
                    kind: envelope.kind,
                    source,
                }),
            },
            MessageKind::GetRequest => match self.codec.decode::<GetRequest>(&envelope.payload) {
                Ok(request) => Request::Get(request),
                Err(source) => fatal(&ProtocolError::MalformedPayload {
                    kind: envelope.kind,
                    source,
                }),
            },
            kind => fatal(&ProtocolError::UnkeyedKind { kind }),
        };

        let handler = self.handlers.read()[envelope.kind.index()].clone();
        match handler {
            Some(handler) => handler(request),
            None => {
                tracing::error!(kind = %envelope.kind, "no request handler registered");
                std::process::abort();
            }
        }
    }
}
