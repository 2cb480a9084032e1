//! The point-to-point contract the engine requires from the substrate.
//!
//! The engine is written against an MPI-shaped surface: every process has a
//! dense integer rank, messages are addressed `(rank, tag)`, inbound
//! traffic is discovered with a non-blocking probe, and sends return a
//! handle that is polled for completion. The contract demands reliable,
//! ordered delivery per `(source, destination)` pair and tag-matched
//! receives; it does not assume any collective primitive beyond what the
//! engine composes from point-to-point sends.

use crate::error::TransportError;
use crate::message::PeerId;

/// A pending inbound message reported by [`Transport::probe`].
///
/// The probe does not consume the message; pass the probe back to
/// [`Transport::recv`] to claim the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Rank the message was sent from.
    pub source: PeerId,
    /// Raw wire tag.
    pub tag: u32,
    /// Payload length in bytes.
    pub len: usize,
}

/// Handle to an in-flight send.
///
/// Owned exclusively by the transceiver once the send is initiated; the
/// record it belongs to is destroyed when completion is observed.
pub trait SendHandle {
    /// Poll whether the transport has finished with the payload buffer.
    ///
    /// May be called repeatedly; once it returns `true` it must keep
    /// returning `true`.
    fn is_complete(&mut self) -> bool;
}

/// Reliable ordered point-to-point substrate with tag-matched receives.
///
/// Implementations must be shareable across the engine's two threads and
/// any number of caller threads.
pub trait Transport: Send + Sync + 'static {
    /// Completion handle returned by [`Transport::try_send`].
    type Handle: SendHandle + Send;

    /// Rank of this process.
    fn rank(&self) -> PeerId;

    /// Total number of processes in the fabric.
    fn size(&self) -> usize;

    /// Non-blocking check for any inbound message, from any source with any
    /// tag. Returns `Ok(None)` when nothing is pending.
    fn probe(&self) -> Result<Option<Probe>, TransportError>;

    /// Receive the message described by a probe.
    ///
    /// # Errors
    ///
    /// [`TransportError::Recv`] when the probed message is no longer
    /// available or the byte count disagrees with the probe.
    fn recv(&self, probe: &Probe) -> Result<Vec<u8>, TransportError>;

    /// Initiate a non-blocking send.
    ///
    /// Sends to a fixed `(target, tag)` pair are delivered in initiation
    /// order.
    ///
    /// # Errors
    ///
    /// [`TransportError::Send`] when the substrate cannot accept the
    /// payload right now; the caller retries.
    fn try_send(
        &self,
        target: PeerId,
        tag: u32,
        payload: &[u8],
    ) -> Result<Self::Handle, TransportError>;

    /// Release the substrate. Called exactly once, at shutdown.
    fn finalize(&self);
}
