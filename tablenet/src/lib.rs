//! # Tablenet
//!
//! Networking substrate for a data-parallel parameter server: a
//! two-threaded RPC engine over a point-to-point transport, with per-key
//! request scheduling between them.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Workers / table-server glue               │
//! │     send, read, broadcast, TableHandler impls        │
//! ├──────────────────────────────────────────────────────┤
//! │  NetworkEngine                                       │
//! │  • transceiver thread: probe, route, pump, reap      │
//! │  • processor thread: schedule, materialize, dispatch │
//! ├───────────────────────┬──────────────────────────────┤
//! │  Request queues       │  Response pool               │
//! │  per-key sync/async   │  per-(kind, source) FIFOs    │
//! ├───────────────────────┴──────────────────────────────┤
//! │  Transport (tablenet-core)                           │
//! │  rank/size, probe, tag-matched recv, testable sends  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`NetworkEngine`] | Owns the transceiver and processor threads |
//! | [`EngineHandle`] | Clonable messaging surface for callers |
//! | [`SyncRequestQueue`] | Strict per-key FIFO, round-robin dispatch |
//! | [`AsyncRequestQueue`] | Per-key put/get lanes with burst alternation |
//! | [`ResponsePool`] | Per-(kind, source) delivery of replies |
//! | [`TableHandler`] | Put/get/update strategy per training algorithm |
//! | [`HandlerRegistry`] | Name-keyed handler factory |
//!
//! ## Quick start
//!
//! ```
//! use tablenet::{
//!     EngineConfig, JsonCodec, MemoryFabric, MessageKind, NetworkEngine, PutResponse, Request,
//! };
//!
//! let fabric = MemoryFabric::new(2);
//! let server = NetworkEngine::init(fabric.endpoint(0), JsonCodec, EngineConfig::local_test());
//! let worker = NetworkEngine::init(fabric.endpoint(1), JsonCodec, EngineConfig::local_test());
//!
//! // The server answers every put with an acknowledgment.
//! let server_handle = server.handle();
//! server.register_request_handler(MessageKind::PutRequest, move |request| {
//!     let Request::Put(put) = request else { return };
//!     server_handle.send(
//!         1,
//!         MessageKind::PutResponse,
//!         &PutResponse { key: put.key, accepted: true },
//!     );
//! });
//!
//! worker.send(
//!     0,
//!     MessageKind::PutRequest,
//!     &tablenet::PutRequest { key: "w".into(), shard: 0, value: vec![] },
//! );
//! let (response, _) = worker
//!     .read_as::<PutResponse>(MessageKind::PutResponse, Some(0))
//!     .expect("reply");
//! assert!(response.accepted);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod engine;
pub mod handler;
pub mod queue;
pub mod response_pool;

// Re-export the foundation crate's surface so downstream code needs a
// single dependency.
pub use tablenet_core::{
    key_of, CodecError, ConfigError, Empty, Envelope, GetRequest, GetResponse, JsonCodec,
    MemoryFabric, MemoryTransport, MessageKind, PayloadCodec, PeerId, Probe, ProtocolError,
    PutRequest, PutResponse, SendHandle, Transport, TransportError,
};

pub use engine::{EngineConfig, EngineHandle, MetricsSnapshot, NetworkEngine, Request};
pub use handler::{
    AdaGradHandler, CheckpointPolicy, HandlerRegistry, LearningRateChange, SgdHandler, TableConfig,
    TableHandler, TableValue,
};
pub use queue::{AsyncRequestQueue, EnqueueError, RequestQueue, SyncRequestQueue};
pub use response_pool::ResponsePool;
