//! Adaptive per-category confidence thresholds.
//!
//! One [`AdaptiveThresholdManager`] lives for a user session and is shared by
//! handle with the pipeline. Thresholds move in three ways:
//!
//! - context: read-only scaling by [`ContextFactors`] for one image
//! - feedback: an accepted low-confidence item lowers its category threshold,
//!   a rejected high-confidence item raises it
//! - metrics: low precision or high confidence spread raises every threshold,
//!   low recall lowers them
//!
//! Every stored threshold and every value handed out is clamped to
//! `[min_threshold, max_threshold]`. Feedback and metrics updates append a
//! snapshot to a bounded history.

pub mod context;
pub mod defaults;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_models::{DetectedItem, UserAction, UserFeedback};
use tracing::{debug, info};

use crate::category::normalize_category;
use crate::error::{poisoned, RefineError, RefineResult};
use crate::quality::{analyze_trend, QualityMetrics, TrendDirection};
use crate::telemetry;

pub use context::ContextFactors;
pub use defaults::{
    ThresholdManagerConfig, DEFAULT_CATEGORY, SEED_THRESHOLDS, THRESHOLD_CEILING, THRESHOLD_FLOOR,
};

/// A snapshot of all thresholds after an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub thresholds: BTreeMap<String, f64>,
    pub reason: String,
}

/// Mutable manager state.
#[derive(Debug, Clone, Default)]
pub struct ThresholdState {
    pub thresholds: BTreeMap<String, f64>,
    pub history: VecDeque<ThresholdHistoryEntry>,
    pub feedback: VecDeque<UserFeedback>,
}

/// Summary of the current thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdStats {
    pub categories: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub history_len: usize,
    pub feedback_count: usize,
}

/// Items removed when thresholds were re-applied.
#[derive(Debug, Clone, Default)]
pub struct ThresholdOutcome {
    pub items: Vec<DetectedItem>,
    pub removed: usize,
    pub combined_factor: f64,
}

fn seeded(config: &ThresholdManagerConfig) -> BTreeMap<String, f64> {
    SEED_THRESHOLDS
        .iter()
        .map(|(category, value)| (category.to_string(), config.clamp(*value)))
        .collect()
}

/// Session-scoped threshold manager. Cloning shares the state.
#[derive(Debug, Clone)]
pub struct AdaptiveThresholdManager {
    config: ThresholdManagerConfig,
    state: Arc<RwLock<ThresholdState>>,
}

impl Default for AdaptiveThresholdManager {
    fn default() -> Self {
        Self::with_config(ThresholdManagerConfig::default())
    }
}

impl AdaptiveThresholdManager {
    /// Create a manager, rejecting configs whose bounds fall outside
    /// `[0.3, 0.95]` or are otherwise unusable.
    pub fn new(config: ThresholdManagerConfig) -> RefineResult<Self> {
        Ok(Self::with_config(config.validated()?))
    }

    fn with_config(config: ThresholdManagerConfig) -> Self {
        let state = ThresholdState {
            thresholds: seeded(&config),
            ..ThresholdState::default()
        };
        Self {
            config,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn config(&self) -> &ThresholdManagerConfig {
        &self.config
    }

    fn lookup(&self, state: &ThresholdState, key: &str) -> f64 {
        state
            .thresholds
            .get(key)
            .or_else(|| state.thresholds.get(DEFAULT_CATEGORY))
            .copied()
            .map_or_else(|| self.config.clamp(0.65), |v| self.config.clamp(v))
    }

    /// Base threshold for a category, falling back to the default entry.
    pub fn threshold(&self, category: &str) -> RefineResult<f64> {
        let state = self.state.read().map_err(poisoned("threshold state"))?;
        Ok(self.lookup(&state, &normalize_category(category)))
    }

    /// Threshold for a category scaled by image context.
    pub fn contextual_threshold(&self, category: &str, factors: &ContextFactors) -> RefineResult<f64> {
        Ok(self.config.clamp(self.threshold(category)? * factors.combined()))
    }

    /// Keep items whose confidence reaches their contextual threshold.
    pub fn apply(&self, items: &[DetectedItem], factors: &ContextFactors) -> RefineResult<ThresholdOutcome> {
        let state = self.state.read().map_err(poisoned("threshold state"))?;
        let combined = factors.combined();

        let kept: Vec<DetectedItem> = items
            .iter()
            .filter(|item| {
                let base = self.lookup(&state, &normalize_category(&item.category));
                let threshold = self.config.clamp(base * combined);
                let keep = item.confidence >= threshold;
                if !keep {
                    debug!(
                        item_id = %item.id,
                        category = %item.category,
                        confidence = item.confidence,
                        threshold,
                        "Dropped by dynamic threshold"
                    );
                }
                keep
            })
            .cloned()
            .collect();

        Ok(ThresholdOutcome {
            removed: items.len() - kept.len(),
            items: kept,
            combined_factor: combined,
        })
    }

    /// Record user feedback and nudge the category threshold.
    ///
    /// Returns the new threshold when it changed.
    pub fn record_feedback(&self, feedback: UserFeedback) -> RefineResult<Option<f64>> {
        if !feedback.confidence.is_finite() {
            return Err(RefineError::non_finite(feedback.item_id, "confidence"));
        }

        let mut state = self.state.write().map_err(poisoned("threshold state"))?;
        let key = normalize_category(&feedback.category);
        let current = self.lookup(&state, &key);
        let lr = self.config.learning_rate;

        let updated = match feedback.user_action {
            UserAction::Accepted if feedback.confidence < current => {
                Some(current - lr * (current - feedback.confidence))
            }
            UserAction::Rejected if feedback.confidence >= current => {
                Some(current + lr * (feedback.confidence - current))
            }
            _ => None,
        }
        .map(|v| self.config.clamp(v));

        let reason = format!("feedback:{}:{}", feedback.user_action, key);
        if state.feedback.len() >= self.config.max_feedback {
            state.feedback.pop_front();
        }
        state.feedback.push_back(feedback);

        if let Some(value) = updated {
            state.thresholds.insert(key.clone(), value);
            self.push_history(&mut state, reason);
            telemetry::record_threshold_update("feedback");
            debug!(category = %key, from = current, to = value, "Threshold adjusted from feedback");
        }

        Ok(updated)
    }

    /// Adjust every threshold from the quality history (oldest first).
    ///
    /// Needs at least two samples. Precision only counts when the latest
    /// sample has predictions (`tp + fp > 0`), recall only when it had
    /// something to find (`tp + fn > 0`). Low precision raises faster when
    /// the precision trend over the history is declining. Returns the
    /// applied delta, if any.
    pub fn adjust_from_metrics(&self, history: &[QualityMetrics]) -> RefineResult<Option<f64>> {
        let [.., _, latest] = history else {
            return Ok(None);
        };

        let counts = latest.counts;
        let low_precision = counts.true_positives + counts.false_positives > 0
            && latest.precision < self.config.precision_floor;
        let low_recall = counts.true_positives + counts.false_negatives > 0
            && latest.recall < self.config.recall_floor;
        let high_variance = latest.confidence_stats.std_dev > self.config.variance_ceiling;

        let step = self.config.adjustment_step;
        let delta = if low_precision || high_variance {
            let precision: Vec<f64> = history
                .iter()
                .filter(|m| m.counts.true_positives + m.counts.false_positives > 0)
                .map(|m| m.precision)
                .collect();
            if analyze_trend(&precision).direction == TrendDirection::Declining {
                step * 1.5
            } else {
                step
            }
        } else if low_recall {
            -step
        } else {
            return Ok(None);
        };

        let mut state = self.state.write().map_err(poisoned("threshold state"))?;
        for value in state.thresholds.values_mut() {
            *value = self.config.clamp(*value + delta);
        }
        let reason = format!(
            "metrics:precision={:.2}:recall={:.2}:delta={:+.3}",
            latest.precision, latest.recall, delta
        );
        self.push_history(&mut state, reason);
        telemetry::record_threshold_update("metrics");
        info!(
            delta,
            precision = latest.precision,
            recall = latest.recall,
            "Thresholds adjusted from quality metrics"
        );

        Ok(Some(delta))
    }

    /// Set one category threshold explicitly.
    pub fn set_threshold(&self, category: &str, value: f64) -> RefineResult<f64> {
        if !value.is_finite() {
            return Err(RefineError::invalid_input(format!(
                "threshold for {category} is not finite"
            )));
        }
        let mut state = self.state.write().map_err(poisoned("threshold state"))?;
        let key = normalize_category(category);
        let value = self.config.clamp(value);
        state.thresholds.insert(key.clone(), value);
        self.push_history(&mut state, format!("manual:{key}"));
        telemetry::record_threshold_update("manual");
        Ok(value)
    }

    fn push_history(&self, state: &mut ThresholdState, reason: String) {
        if state.history.len() >= self.config.max_history {
            state.history.pop_front();
        }
        let entry = ThresholdHistoryEntry {
            timestamp: Utc::now(),
            thresholds: state.thresholds.clone(),
            reason,
        };
        state.history.push_back(entry);
    }

    /// Restore seed thresholds and drop history and feedback.
    pub fn clear(&self) -> RefineResult<()> {
        let mut state = self.state.write().map_err(poisoned("threshold state"))?;
        *state = ThresholdState {
            thresholds: seeded(&self.config),
            ..ThresholdState::default()
        };
        Ok(())
    }

    /// Current thresholds by normalized category.
    pub fn snapshot(&self) -> RefineResult<BTreeMap<String, f64>> {
        Ok(self.state.read().map_err(poisoned("threshold state"))?.thresholds.clone())
    }

    /// Update history, oldest first.
    pub fn history(&self) -> RefineResult<Vec<ThresholdHistoryEntry>> {
        let state = self.state.read().map_err(poisoned("threshold state"))?;
        Ok(state.history.iter().cloned().collect())
    }

    /// Recorded feedback, oldest first.
    pub fn feedback(&self) -> RefineResult<Vec<UserFeedback>> {
        let state = self.state.read().map_err(poisoned("threshold state"))?;
        Ok(state.feedback.iter().cloned().collect())
    }

    pub fn stats(&self) -> RefineResult<ThresholdStats> {
        let state = self.state.read().map_err(poisoned("threshold state"))?;
        let values: Vec<f64> = state.thresholds.values().copied().collect();
        if values.is_empty() {
            return Ok(ThresholdStats {
                history_len: state.history.len(),
                feedback_count: state.feedback.len(),
                ..ThresholdStats::default()
            });
        }
        Ok(ThresholdStats {
            categories: values.len(),
            mean: values.iter().sum::<f64>() / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            history_len: state.history.len(),
            feedback_count: state.feedback.len(),
        })
    }
}
