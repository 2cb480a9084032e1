//! Momentum SGD handler.

use super::config::{LearningRateChange, TableConfig};
use super::{CheckpointPolicy, TableHandler, TableValue};

/// SGD with momentum, weight decay, and a named learning-rate schedule.
///
/// Each accepted delta performs one momentum step:
///
/// ```text
/// h[i] = momentum * h[i] - lr(step) * (g[i] + weight_decay * w[i])
/// w[i] = w[i] + h[i]
/// ```
///
/// where `lr(step)` follows the configured schedule evaluated at the
/// record's current version.
#[derive(Debug, Clone)]
pub struct SgdHandler {
    learning_rate: f32,
    gamma: f32,
    momentum: f32,
    weight_decay: f32,
    schedule: LearningRateChange,
    change_steps: u32,
    checkpoint: CheckpointPolicy,
}

impl Default for SgdHandler {
    fn default() -> Self {
        let mut handler = Self {
            learning_rate: 0.0,
            gamma: 0.0,
            momentum: 0.0,
            weight_decay: 0.0,
            schedule: LearningRateChange::Fixed,
            change_steps: 1,
            checkpoint: CheckpointPolicy::default(),
        };
        handler.setup(&TableConfig::default());
        handler
    }
}

impl SgdHandler {
    /// A handler with default hyperparameters; call
    /// [`TableHandler::setup`] to override them.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the configured schedule at an update step.
    pub fn learning_rate_at(&self, step: u64) -> f32 {
        let base = self.learning_rate;
        let granularity = self.change_steps.max(1);
        match self.schedule {
            LearningRateChange::Fixed => base,
            LearningRateChange::Step => {
                base * self.gamma.powi((step / u64::from(granularity)) as i32)
            }
            LearningRateChange::Exp => base * self.gamma.powf(step as f32),
            LearningRateChange::Poly => {
                base * (1.0 - step as f32 / granularity as f32).max(0.0)
            }
            LearningRateChange::Inverse => base / (1.0 + self.gamma * step as f32),
        }
    }
}

impl TableHandler for SgdHandler {
    fn setup(&mut self, config: &TableConfig) {
        self.learning_rate = config.learning_rate;
        self.gamma = config.gamma;
        self.momentum = config.momentum;
        self.weight_decay = config.weight_decay;
        self.schedule = config.learning_rate_change;
        self.change_steps = config.learning_rate_change_steps;
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
        TableValue {
            version: stored.version,
            data: stored.data.clone(),
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
        if stored.history.len() != stored.data.len() {
            stored.history.resize(stored.data.len(), 0.0);
        }
        let lr = self.learning_rate_at(stored.version);
        for i in 0..stored.data.len() {
            let gradient = delta.data[i] + self.weight_decay * stored.data[i];
            stored.history[i] = self.momentum * stored.history[i] - lr * gradient;
            stored.data[i] += stored.history[i];
        }
        stored.version += 1;
        true
    }

    fn checkpoint_now(&self, _key: &str, value: &TableValue) -> bool {
        self.checkpoint.due(value.version)
    }
}
