//! Seed thresholds and manager configuration.

use serde::{Deserialize, Serialize};

use crate::error::{RefineError, RefineResult};

/// Outer limits for any configured threshold bound.
pub const THRESHOLD_FLOOR: f64 = 0.3;
pub const THRESHOLD_CEILING: f64 = 0.95;

/// Key used for categories without their own entry.
pub const DEFAULT_CATEGORY: &str = "default";

/// Seed thresholds per normalized category. Body parts are the least
/// likely to be catalogue items and get the highest bar.
pub const SEED_THRESHOLDS: &[(&str, f64)] = &[
    ("accessories", 0.6),
    ("jewelry", 0.6),
    ("electronics", 0.65),
    ("clothing", 0.7),
    ("furniture", 0.7),
    ("home_decor", 0.65),
    ("kitchenware", 0.65),
    ("books", 0.65),
    ("toys", 0.65),
    (DEFAULT_CATEGORY, 0.65),
    ("person", 0.85),
    ("body_part", 0.9),
    ("face", 0.9),
    ("hand", 0.9),
];

/// Adaptive threshold manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdManagerConfig {
    /// Fraction of the confidence gap applied per feedback event (default: 0.1)
    pub learning_rate: f64,
    /// Fixed step for metrics-based adjustments (default: 0.02)
    pub adjustment_step: f64,
    pub max_history: usize,
    pub max_feedback: usize,
    pub min_threshold: f64,
    pub max_threshold: f64,
    /// Precision below which thresholds are raised (default: 0.7)
    pub precision_floor: f64,
    /// Recall below which thresholds are lowered (default: 0.7)
    pub recall_floor: f64,
    /// Confidence std dev above which thresholds are raised (default: 0.25)
    pub variance_ceiling: f64,
}

impl Default for ThresholdManagerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            adjustment_step: 0.02,
            max_history: 100,
            max_feedback: 200,
            min_threshold: 0.3,
            max_threshold: 0.95,
            precision_floor: 0.7,
            recall_floor: 0.7,
            variance_ceiling: 0.25,
        }
    }
}

impl ThresholdManagerConfig {
    /// Clamp a threshold into the configured bounds.
    ///
    /// Never panics, even on an unvalidated config.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min_threshold).min(self.max_threshold)
    }

    /// Human-readable problems with this config. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let bounds = THRESHOLD_FLOOR..=THRESHOLD_CEILING;
        for (name, value) in [
            ("min_threshold", self.min_threshold),
            ("max_threshold", self.max_threshold),
        ] {
            if !bounds.contains(&value) {
                errors.push(format!(
                    "{name} must be within [{THRESHOLD_FLOOR}, {THRESHOLD_CEILING}], got {value}"
                ));
            }
        }
        if self.min_threshold > self.max_threshold {
            errors.push(format!(
                "min_threshold ({}) must not exceed max_threshold ({})",
                self.min_threshold, self.max_threshold
            ));
        }

        for (name, value) in [
            ("learning_rate", self.learning_rate),
            ("adjustment_step", self.adjustment_step),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                errors.push(format!("{name} must be within (0, 1], got {value}"));
            }
        }

        for (name, value) in [
            ("precision_floor", self.precision_floor),
            ("recall_floor", self.recall_floor),
            ("variance_ceiling", self.variance_ceiling),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{name} must be within [0, 1], got {value}"));
            }
        }

        if self.max_history == 0 {
            errors.push("max_history must be positive".to_string());
        }
        if self.max_feedback == 0 {
            errors.push("max_feedback must be positive".to_string());
        }

        errors
    }

    /// Return the config when valid, otherwise every problem at once.
    pub fn validated(self) -> RefineResult<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(RefineError::InvalidConfig(errors))
        }
    }
}
