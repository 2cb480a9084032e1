//! Parameter handlers: the strategy objects behind put/get/update.
//!
//! The processor turns request envelopes into typed requests; the
//! surrounding table server answers them by driving a [`TableHandler`] —
//! one per table, chosen by training algorithm. Two implementations ship
//! with the crate: momentum SGD ([`SgdHandler`]) and AdaGrad
//! ([`AdaGradHandler`]); new algorithms plug in through the
//! [`HandlerRegistry`].

pub mod adagrad;
pub mod config;
pub mod registry;
pub mod sgd;

use serde::{Deserialize, Serialize};

pub use adagrad::AdaGradHandler;
pub use config::{LearningRateChange, TableConfig};
pub use registry::HandlerRegistry;
pub use sgd::SgdHandler;

/// Stored record for one parameter key.
///
/// `data` holds the parameter values. `history` is algorithm state: the
/// momentum buffer for SGD, the squared-gradient accumulator for AdaGrad.
/// `grad` holds gradient sums not yet folded into `data` (used by
/// handlers that defer application to read time). A delta sent by a
/// worker carries its gradient in `data` and leaves the other buffers
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableValue {
    /// Number of updates merged into this record.
    pub version: u64,
    /// Parameter values, or the gradient when the record is a delta.
    pub data: Vec<f32>,
    /// Per-coordinate algorithm state.
    pub history: Vec<f32>,
    /// Accumulated gradient pending application.
    pub grad: Vec<f32>,
}

impl TableValue {
    /// A fresh record holding `data` with zeroed algorithm state.
    pub fn from_data(data: Vec<f32>) -> Self {
        let len = data.len();
        Self {
            version: 0,
            data,
            history: vec![0.0; len],
            grad: vec![0.0; len],
        }
    }

    /// A delta record carrying a gradient.
    pub fn delta(gradient: Vec<f32>) -> Self {
        Self {
            version: 0,
            data: gradient,
            history: Vec::new(),
            grad: Vec::new(),
        }
    }
}

/// Capability set of a parameter handler.
///
/// Implementations are driven by the table server: `put` installs a first
/// value, `update` merges worker deltas, `get` materializes read
/// responses, and `checkpoint_now` gates persistence.
pub trait TableHandler: Send {
    /// Install hyperparameters. Called once before any traffic.
    fn setup(&mut self, config: &TableConfig);

    /// Produce the stored record for a key's first value.
    fn put(&self, key: &str, incoming: TableValue) -> TableValue;

    /// Materialize a read response from the stored record.
    fn get(&self, key: &str, stored: &TableValue) -> TableValue;

    /// Merge a delta into the stored record. Returns whether the update
    /// was accepted; a rejected update leaves `stored` untouched.
    fn update(&self, stored: &mut TableValue, delta: &TableValue) -> bool;

    /// Whether this (key, value) should be persisted now, given the
    /// configured checkpoint policy.
    fn checkpoint_now(&self, key: &str, value: &TableValue) -> bool;
}

/// Checkpoint gating shared by the shipped handlers: persistence starts
/// once `checkpoint_after` versions have accumulated and recurs every
/// `checkpoint_frequency` versions after that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointPolicy {
    /// Version at which checkpointing begins.
    pub after: u64,
    /// Versions between checkpoints; zero disables checkpointing.
    pub frequency: u64,
}

impl CheckpointPolicy {
    /// Extract the policy fields from a table configuration.
    pub fn from_config(config: &TableConfig) -> Self {
        Self {
            after: config.checkpoint_after,
            frequency: config.checkpoint_frequency,
        }
    }

    /// Whether a record at `version` is due for a checkpoint.
    pub fn due(&self, version: u64) -> bool {
        self.frequency > 0 && version >= self.after && (version - self.after) % self.frequency == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_data_zeroes_algorithm_state() {
        let value = TableValue::from_data(vec![1.0, 2.0]);
        assert_eq!(value.version, 0);
        assert_eq!(value.history, vec![0.0, 0.0]);
        assert_eq!(value.grad, vec![0.0, 0.0]);
    }

    #[test]
    fn checkpoint_policy_fires_on_schedule() {
        let policy = CheckpointPolicy {
            after: 10,
            frequency: 5,
        };
        assert!(!policy.due(9));
        assert!(policy.due(10));
        assert!(!policy.due(12));
        assert!(policy.due(15));
        assert!(policy.due(20));
    }

    #[test]
    fn zero_frequency_disables_checkpoints() {
        let policy = CheckpointPolicy {
            after: 0,
            frequency: 0,
        };
        assert!(!policy.due(0));
        assert!(!policy.due(1_000));
    }
}
