//! AdaGrad handler.

use super::config::TableConfig;
use super::{CheckpointPolicy, TableHandler, TableValue};

/// Guards the inverse-root scaling against fresh, all-zero accumulators.
const STABILITY_EPSILON: f32 = 1e-8;

/// AdaGrad with read-time application.
///
/// `update` only accumulates: each delta's gradient is summed into
/// `grad` and its square into the per-coordinate accumulator `history`.
/// `get` materializes the adjusted weights,
///
/// ```text
/// out[i] = w[i] - lr * grad[i] / (sqrt(history[i]) + eps)
/// ```
///
/// so coordinates that have seen large gradients take proportionally
/// smaller steps. The stored weights themselves are rebased only when a
/// put arrives for the key.
#[derive(Debug, Clone)]
pub struct AdaGradHandler {
    learning_rate: f32,
    checkpoint: CheckpointPolicy,
}

impl Default for AdaGradHandler {
    fn default() -> Self {
        let mut handler = Self {
            learning_rate: 0.0,
            checkpoint: CheckpointPolicy::default(),
        };
        handler.setup(&TableConfig::default());
        handler
    }
}

impl AdaGradHandler {
    /// A handler with default hyperparameters; call
    /// [`TableHandler::setup`] to override them.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableHandler for AdaGradHandler {
    fn setup(&mut self, config: &TableConfig) {
        self.learning_rate = config.learning_rate;
        self.checkpoint = CheckpointPolicy::from_config(config);
    }

    fn put(&self, _key: &str, incoming: TableValue) -> TableValue {
        let len = incoming.data.len();
        TableValue {
            version: incoming.version,
            data: incoming.data,
            history: vec![0.0; len],
            grad: vec![0.0; len],
        }
    }

    fn get(&self, _key: &str, stored: &TableValue) -> TableValue {
        let data = stored
            .data
            .iter()
            .enumerate()
            .map(|(i, &weight)| {
                let gradient = stored.grad.get(i).copied().unwrap_or(0.0);
                let accumulated = stored.history.get(i).copied().unwrap_or(0.0);
                weight - self.learning_rate * gradient / (accumulated.sqrt() + STABILITY_EPSILON)
            })
            .collect();
        TableValue {
            version: stored.version,
            data,
            history: Vec::new(),
            grad: Vec::new(),
        }
    }

    fn update(&self, stored: &mut TableValue, delta: &TableValue) -> bool {
        if delta.data.len() != stored.data.len() {
            tracing::warn!(
                expected = stored.data.len(),
                got = delta.data.len(),
                "rejecting delta with mismatched dimension"
            );
            return false;
        }
        if stored.grad.len() != stored.data.len() {
            stored.grad.resize(stored.data.len(), 0.0);
        }
        if stored.history.len() != stored.data.len() {
            stored.history.resize(stored.data.len(), 0.0);
        }
        for (i, &gradient) in delta.data.iter().enumerate() {
            stored.grad[i] += gradient;
            stored.history[i] += gradient * gradient;
        }
        stored.version += 1;
        true
    }

    fn checkpoint_now(&self, _key: &str, value: &TableValue) -> bool {
        self.checkpoint.due(value.version)
    }
}
