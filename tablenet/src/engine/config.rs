//! Engine configuration.

use std::time::Duration;

/// Configuration for the network engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sleep between poll attempts in the transceiver, the processor, and
    /// blocking reads.
    pub sleep_time: Duration,

    /// Number of memory-server peers in the fabric. Sets the lane burst
    /// length and occupancy bound of the asynchronous queue.
    pub num_memory_servers: usize,

    /// Selects the scheduling discipline: `true` for the strict per-key
    /// FIFO, `false` for the lane-alternating queue. Fixed at `init`.
    pub sync_update: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sleep_time: Duration::from_millis(1),
            num_memory_servers: 1,
            sync_update: true,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with the default poll interval.
    pub fn new(num_memory_servers: usize, sync_update: bool) -> Self {
        Self {
            num_memory_servers,
            sync_update,
            ..Self::default()
        }
    }

    /// Override the poll interval.
    pub fn with_sleep_time(mut self, sleep_time: Duration) -> Self {
        self.sleep_time = sleep_time;
        self
    }

    /// Short poll interval for in-process tests.
    pub fn local_test() -> Self {
        Self::default().with_sleep_time(Duration::from_micros(100))
    }
}
