//! # Tablenet Core
//!
//! Foundation types for the tablenet parameter-server networking substrate.
//!
//! This crate holds everything the engine crate builds on but that has no
//! knowledge of the engine itself:
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`MessageKind`] | Closed tag enumeration routing every message |
//! | [`Envelope`] | Tag + opaque payload, the unit moved between queues |
//! | [`Transport`] | Contract the engine requires from the substrate |
//! | [`MemoryFabric`] | In-process transport for tests and single-host runs |
//! | [`proto`] | Payload schemas exchanged by workers and memory servers |
//! | [`PayloadCodec`] | Pluggable payload encoding with a JSON default |
//!
//! The transport contract is deliberately narrow: reliable ordered
//! point-to-point delivery, tag-matched receives, a non-blocking probe, and
//! non-blocking sends testable for completion. Anything that satisfies it
//! (an in-process fabric, a collective communication library binding) can
//! carry the engine.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod codec;
pub mod error;
pub mod memory;
pub mod message;
pub mod proto;
pub mod transport;

pub use codec::{CodecError, JsonCodec, PayloadCodec};
pub use error::{ConfigError, ProtocolError, TransportError};
pub use memory::{MemoryFabric, MemoryTransport};
pub use message::{Envelope, MessageKind, PeerId};
pub use proto::{key_of, Empty, GetRequest, GetResponse, PutRequest, PutResponse};
pub use transport::{Probe, SendHandle, Transport};
