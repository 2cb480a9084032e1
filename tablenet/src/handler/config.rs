//! Handler hyperparameter configuration.

use serde::{Deserialize, Serialize};

/// Named learning-rate schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningRateChange {
    /// Constant base rate.
    Fixed,
    /// Base rate times `gamma ^ (step / change_steps)`.
    Step,
    /// Base rate times `gamma ^ step`.
    Exp,
    /// Base rate decayed linearly to zero over `change_steps`.
    Poly,
    /// Base rate divided by `1 + gamma * step`.
    Inverse,
}

/// Hyperparameters installed into a handler via `setup`.
///
/// All fields have defaults so a deployment only spells out what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Base learning rate.
    pub learning_rate: f32,
    /// Schedule decay parameter.
    pub gamma: f32,
    /// Momentum coefficient (SGD).
    pub momentum: f32,
    /// L2 weight-decay coefficient (SGD).
    pub weight_decay: f32,
    /// Which learning-rate schedule applies.
    pub learning_rate_change: LearningRateChange,
    /// Step granularity for the `step` and `poly` schedules.
    pub learning_rate_change_steps: u32,
    /// Version at which checkpointing begins.
    pub checkpoint_after: u64,
    /// Versions between checkpoints; zero disables checkpointing.
    pub checkpoint_frequency: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            gamma: 0.5,
            momentum: 0.0,
            weight_decay: 0.0,
            learning_rate_change: LearningRateChange::Fixed,
            learning_rate_change_steps: 1,
            checkpoint_after: 0,
            checkpoint_frequency: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_configs_fill_from_defaults() {
        let config: TableConfig =
            serde_json::from_str(r#"{"learning_rate": 0.1, "learning_rate_change": "step"}"#)
                .expect("parse");
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.learning_rate_change, LearningRateChange::Step);
        assert_eq!(config.momentum, 0.0);
        assert_eq!(config.checkpoint_frequency, 0);
    }

    #[test]
    fn schedule_names_are_snake_case() {
        let parsed: LearningRateChange = serde_json::from_str(r#""inverse""#).expect("parse");
        assert_eq!(parsed, LearningRateChange::Inverse);
    }
}
