//! Engine traffic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cross-thread counters maintained by the engine loops.
#[derive(Debug, Default)]
pub(crate) struct EngineMetrics {
    messages_received: AtomicU64,
    requests_enqueued: AtomicU64,
    responses_pooled: AtomicU64,
    sends_initiated: AtomicU64,
    sends_retried: AtomicU64,
    sends_completed: AtomicU64,
}

impl EngineMetrics {
    pub(crate) fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request_enqueued(&self) {
        self.requests_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response_pooled(&self) {
        self.responses_pooled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_initiated(&self) {
        self.sends_initiated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_retried(&self) {
        self.sends_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_completed(&self) {
        self.sends_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            requests_enqueued: self.requests_enqueued.load(Ordering::Relaxed),
            responses_pooled: self.responses_pooled.load(Ordering::Relaxed),
            sends_initiated: self.sends_initiated.load(Ordering::Relaxed),
            sends_retried: self.sends_retried.load(Ordering::Relaxed),
            sends_completed: self.sends_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages received from the transport, of any kind.
    pub messages_received: u64,
    /// Request envelopes routed into the scheduling queue.
    pub requests_enqueued: u64,
    /// Payloads delivered into the response pool.
    pub responses_pooled: u64,
    /// Sends handed to the transport.
    pub sends_initiated: u64,
    /// Send attempts the transport rejected and that were requeued.
    pub sends_retried: u64,
    /// Send records reaped after the transport reported completion.
    pub sends_completed: u64,
}
