//! End-to-end engine tests over an in-process fabric.
//!
//! Every test spins up one engine per rank, drives real traffic through
//! the transceiver and processor threads, and shuts the engines down
//! explicitly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tablenet::{
    Empty, EngineConfig, GetRequest, GetResponse, JsonCodec, MemoryFabric, MemoryTransport,
    MessageKind, NetworkEngine, Probe, PutRequest, PutResponse, Request, Transport, TransportError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn engine(fabric: &MemoryFabric, rank: usize) -> NetworkEngine<MemoryTransport, JsonCodec> {
    NetworkEngine::init(fabric.endpoint(rank), JsonCodec, EngineConfig::local_test())
}

#[test]
fn put_request_round_trip() {
    init_tracing();
    let fabric = MemoryFabric::new(2);
    let server = engine(&fabric, 0);
    let worker = engine(&fabric, 1);

    let seen_keys = Arc::new(Mutex::new(Vec::new()));
    let replies = server.handle();
    let keys = Arc::clone(&seen_keys);
    server.register_request_handler(MessageKind::PutRequest, move |request| {
        let Request::Put(put) = request else {
            return;
        };
        keys.lock().expect("lock").push(put.key.clone());
        replies.send(
            1,
            MessageKind::PutResponse,
            &PutResponse {
                key: put.key,
                accepted: true,
            },
        );
    });

    worker.send(
        0,
        MessageKind::PutRequest,
        &PutRequest {
            key: "conv1".to_string(),
            shard: 0,
            value: vec![1, 2, 3],
        },
    );

    let (response, source) = worker
        .read_as::<PutResponse>(MessageKind::PutResponse, Some(0))
        .expect("reply");
    assert_eq!(source, 0);
    assert_eq!(response.key, "conv1");
    assert!(response.accepted);
    assert_eq!(*seen_keys.lock().expect("lock"), vec!["conv1".to_string()]);

    let metrics = worker.metrics();
    assert_eq!(metrics.sends_initiated, 1);
    assert_eq!(metrics.sends_completed, 1);
    assert_eq!(metrics.responses_pooled, 1);

    worker.shutdown();
    server.shutdown();
}

#[test]
fn get_dispatch_through_the_async_queue() {
    init_tracing();
    let fabric = MemoryFabric::new(2);
    let config = EngineConfig::new(1, false).with_sleep_time(Duration::from_micros(100));
    let server = NetworkEngine::init(fabric.endpoint(0), JsonCodec, config);
    let worker = engine(&fabric, 1);

    let replies = server.handle();
    server.register_request_handler(MessageKind::PutRequest, |_| {});
    server.register_request_handler(MessageKind::GetRequest, move |request| {
        let Request::Get(get) = request else {
            return;
        };
        replies.send(
            get.source as usize,
            MessageKind::GetResponse,
            &GetResponse {
                key: get.key,
                value: vec![42],
            },
        );
    });

    // The lane discipline requires a key's first message to be a put.
    worker.send(
        0,
        MessageKind::PutRequest,
        &PutRequest {
            key: "bias".to_string(),
            shard: 0,
            value: Vec::new(),
        },
    );
    worker.send(
        0,
        MessageKind::GetRequest,
        &GetRequest {
            key: "bias".to_string(),
            source: 1,
        },
    );

    let (response, _) = worker
        .read_as::<GetResponse>(MessageKind::GetResponse, Some(0))
        .expect("reply");
    assert_eq!(response.key, "bias");
    assert_eq!(response.value, vec![42]);

    worker.shutdown();
    server.shutdown();
}

#[test]
fn sync_broadcast_joins_every_acknowledgment() {
    init_tracing();
    let size = 4;
    let fabric = MemoryFabric::new(size);
    let engines: Vec<_> = (0..size).map(|rank| engine(&fabric, rank)).collect();
    let coordinator = size - 1;

    // Each worker waits for the assignment, then acknowledges it.
    let workers: Vec<_> = engines[..coordinator]
        .iter()
        .map(|worker| {
            let handle = worker.handle();
            thread::spawn(move || {
                let (_, source) = handle
                    .read(MessageKind::ShardAssignment, Some(3))
                    .expect("assignment");
                assert_eq!(source, 3);
                handle.send(3, MessageKind::Ack, &Empty {});
            })
        })
        .collect();

    assert!(engines[coordinator].sync_broadcast(
        MessageKind::ShardAssignment,
        MessageKind::Ack,
        &Empty {},
    ));
    for worker in workers {
        worker.join().expect("worker thread");
    }

    // All three acknowledgments were consumed by the join.
    assert_eq!(engines[coordinator].try_read(MessageKind::Ack, None), None);

    for engine in &engines {
        engine.shutdown();
    }
}

#[test]
fn sends_to_one_destination_arrive_in_enqueue_order() {
    init_tracing();
    let fabric = MemoryFabric::new(2);
    let sender = engine(&fabric, 0);
    let receiver = engine(&fabric, 1);

    for i in 0..20u32 {
        sender.send(
            1,
            MessageKind::PutResponse,
            &PutResponse {
                key: i.to_string(),
                accepted: true,
            },
        );
    }
    sender.flush();

    for i in 0..20u32 {
        let (response, _) = receiver
            .read_as::<PutResponse>(MessageKind::PutResponse, Some(0))
            .expect("message");
        assert_eq!(response.key, i.to_string());
    }

    sender.shutdown();
    receiver.shutdown();
}

#[test]
fn callbacks_fire_after_routing() {
    init_tracing();
    let fabric = MemoryFabric::new(2);
    let coordinator = engine(&fabric, 0);
    let worker = engine(&fabric, 1);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&observed);
    let pool_side = coordinator.handle();
    coordinator.register_callback(MessageKind::RegisterWorker, move |source, kind| {
        // Routing happens before the callback, so the payload is already
        // readable.
        let pending = pool_side.try_read(MessageKind::RegisterWorker, Some(source));
        log.lock().expect("lock").push((source, kind, pending.is_some()));
    });

    worker.send(0, MessageKind::RegisterWorker, &Empty {});
    worker.flush();

    // Give the coordinator's transceiver a moment to route and fire.
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while observed.lock().expect("lock").is_empty() {
        assert!(std::time::Instant::now() < deadline, "callback never fired");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(
        *observed.lock().expect("lock"),
        vec![(1, MessageKind::RegisterWorker, true)]
    );

    worker.shutdown();
    coordinator.shutdown();
}

/// Rejects the first few sends to exercise the retry path.
struct FlakyTransport {
    inner: MemoryTransport,
    rejections: AtomicUsize,
}

impl Transport for FlakyTransport {
    type Handle = <MemoryTransport as Transport>::Handle;

    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn probe(&self) -> Result<Option<Probe>, TransportError> {
        self.inner.probe()
    }

    fn recv(&self, probe: &Probe) -> Result<Vec<u8>, TransportError> {
        self.inner.recv(probe)
    }

    fn try_send(
        &self,
        target: usize,
        tag: u32,
        payload: &[u8],
    ) -> Result<Self::Handle, TransportError> {
        if self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                (left > 0).then(|| left - 1)
            })
            .is_ok()
        {
            return Err(TransportError::Send {
                target,
                message: "injected rejection".to_string(),
            });
        }
        self.inner.try_send(target, tag, payload)
    }

    fn finalize(&self) {
        self.inner.finalize();
    }
}

#[test]
fn rejected_sends_are_retried_transparently() {
    init_tracing();
    let fabric = MemoryFabric::new(2);
    let sender = NetworkEngine::init(
        FlakyTransport {
            inner: fabric.endpoint(0),
            rejections: AtomicUsize::new(3),
        },
        JsonCodec,
        EngineConfig::local_test(),
    );
    let receiver = engine(&fabric, 1);

    sender.send(
        1,
        MessageKind::PutResponse,
        &PutResponse {
            key: "retried".to_string(),
            accepted: true,
        },
    );
    sender.flush();

    let (response, _) = receiver
        .read_as::<PutResponse>(MessageKind::PutResponse, Some(0))
        .expect("message");
    assert_eq!(response.key, "retried");

    let metrics = sender.metrics();
    assert_eq!(metrics.sends_retried, 3);
    assert_eq!(metrics.sends_initiated, 1);
    assert_eq!(metrics.sends_completed, 1);

    sender.shutdown();
    receiver.shutdown();
}

#[test]
fn shutdown_is_idempotent_and_unblocks_readers() {
    init_tracing();
    let fabric = MemoryFabric::new(1);
    let engine = engine(&fabric, 0);

    let reader = {
        let handle = engine.handle();
        thread::spawn(move || handle.read(MessageKind::GetResponse, None))
    };
    thread::sleep(Duration::from_millis(5));

    engine.shutdown();
    engine.shutdown();
    assert!(reader.join().expect("reader thread").is_none());
    // Drop runs shutdown a third time; it must stay a no-op.
}

#[test]
#[should_panic(expected = "request kinds")]
fn response_kinds_cannot_take_request_handlers() {
    let fabric = MemoryFabric::new(1);
    let engine = engine(&fabric, 0);
    engine.register_request_handler(MessageKind::Ack, |_| {});
}
