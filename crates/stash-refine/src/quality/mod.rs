//! Quality metrics tracking across a session.
//!
//! Without ground truth the tracker estimates precision and recall from the
//! pipeline's own input and output. These are heuristic proxies and are
//! labelled as such through [`MetricSource::HeuristicProxy`]:
//!
//! - true positive: kept, confidence >= 0.7, not an ignore-class name
//! - false positive: kept with confidence < 0.5, or an ignore-class name
//! - false negative: removed although confidence >= 0.8 and not ignore-class
//!
//! Callers that do know the truth (e.g. from user feedback) record exact
//! counts with [`QualityMetricsTracker::record_labeled`].

pub mod recommendations;
pub mod stats;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_models::{DetectedItem, ObjectClass};
use tracing::debug;

use crate::category::CategoryClassifier;
use crate::error::{poisoned, RefineResult};

pub use recommendations::{AlertSeverity, QualityAlert};
pub use stats::{
    analyze_trend, calculate_f1, calculate_precision, calculate_recall, find_outliers,
    ConfidenceStats, Trend, TrendDirection,
};

/// Confidence at which a kept item counts as a true positive.
const TP_CONFIDENCE: f64 = 0.7;
/// Confidence below which a kept item counts as a false positive.
const FP_CONFIDENCE: f64 = 0.5;
/// Confidence at which a removed item counts as a false negative.
const FN_CONFIDENCE: f64 = 0.8;

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTrackerConfig {
    /// Rolling history length (default: 100)
    pub max_history: usize,
    pub precision_target: f64,
    pub recall_target: f64,
    /// Confidence std dev above which an alert is raised (default: 0.25)
    pub variance_alert: f64,
    pub processing_budget_ms: u64,
}

impl Default for QualityTrackerConfig {
    fn default() -> Self {
        Self {
            max_history: 100,
            precision_target: 0.7,
            recall_target: 0.7,
            variance_alert: 0.25,
            processing_budget_ms: 3000,
        }
    }
}

/// Where the counts behind a metrics record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    #[default]
    HeuristicProxy,
    Labeled,
}

/// True/false positive and false negative counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl DetectionCounts {
    /// Estimate counts from a batch's input and output.
    pub fn estimate(
        input: &[DetectedItem],
        output: &[DetectedItem],
        classifier: &CategoryClassifier,
    ) -> Self {
        let ignored = |item: &DetectedItem| classifier.classify(&item.name) == ObjectClass::ObjectsToIgnore;
        let kept_ids: HashSet<&str> = output.iter().map(|i| i.id.as_str()).collect();

        let mut counts = Self::default();
        for item in output {
            if ignored(item) || item.confidence < FP_CONFIDENCE {
                counts.false_positives += 1;
            } else if item.confidence >= TP_CONFIDENCE {
                counts.true_positives += 1;
            }
        }
        counts.false_negatives = input
            .iter()
            .filter(|item| {
                !kept_ids.contains(item.id.as_str())
                    && item.confidence >= FN_CONFIDENCE
                    && !ignored(*item)
            })
            .count();
        counts
    }
}

/// Quality of one refined batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confidence_stats: ConfidenceStats,
    pub counts: DetectionCounts,
    pub source: MetricSource,
    /// Output items whose confidence is a 2σ outlier
    pub outliers: usize,
    pub input_count: usize,
    pub output_count: usize,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl QualityMetrics {
    /// Build a record from counts and the batch output.
    pub fn from_counts(
        counts: DetectionCounts,
        source: MetricSource,
        input_count: usize,
        output: &[DetectedItem],
        processing_time: Duration,
    ) -> Self {
        let precision = calculate_precision(counts.true_positives, counts.false_positives);
        let recall = calculate_recall(counts.true_positives, counts.false_negatives);
        let confidences: Vec<f64> = output.iter().map(|i| i.confidence).collect();

        Self {
            precision,
            recall,
            f1_score: calculate_f1(precision, recall),
            confidence_stats: ConfidenceStats::from_values(&confidences),
            counts,
            source,
            outliers: find_outliers(&confidences).len(),
            input_count,
            output_count: output.len(),
            processing_time_ms: processing_time.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        }
    }
}

/// Trends over the tracker history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityTrends {
    pub precision: Trend,
    pub recall: Trend,
    pub f1_score: Trend,
}

/// Aggregate over the tracker history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySummary {
    pub samples: usize,
    pub average_precision: f64,
    pub average_recall: f64,
    pub average_f1: f64,
    pub average_confidence_std_dev: f64,
    pub average_processing_time_ms: f64,
    pub precision_trend: Trend,
    pub recall_trend: Trend,
    pub f1_trend: Trend,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Session-scoped rolling history of quality metrics.
///
/// Cloning shares the underlying history.
#[derive(Debug, Clone)]
pub struct QualityMetricsTracker {
    config: QualityTrackerConfig,
    history: Arc<RwLock<VecDeque<QualityMetrics>>>,
}

impl Default for QualityMetricsTracker {
    fn default() -> Self {
        Self::new(QualityTrackerConfig::default())
    }
}

impl QualityMetricsTracker {
    pub fn new(config: QualityTrackerConfig) -> Self {
        Self {
            history: Arc::new(RwLock::new(VecDeque::with_capacity(config.max_history))),
            config,
        }
    }

    pub fn config(&self) -> &QualityTrackerConfig {
        &self.config
    }

    /// Record a batch using heuristic proxy counts.
    pub fn record(
        &self,
        input: &[DetectedItem],
        output: &[DetectedItem],
        classifier: &CategoryClassifier,
        processing_time: Duration,
    ) -> RefineResult<QualityMetrics> {
        let counts = DetectionCounts::estimate(input, output, classifier);
        let metrics = QualityMetrics::from_counts(
            counts,
            MetricSource::HeuristicProxy,
            input.len(),
            output,
            processing_time,
        );
        self.push(metrics.clone())?;
        Ok(metrics)
    }

    /// Record a batch with known counts.
    pub fn record_labeled(
        &self,
        counts: DetectionCounts,
        input_count: usize,
        output: &[DetectedItem],
        processing_time: Duration,
    ) -> RefineResult<QualityMetrics> {
        let metrics =
            QualityMetrics::from_counts(counts, MetricSource::Labeled, input_count, output, processing_time);
        self.push(metrics.clone())?;
        Ok(metrics)
    }

    fn push(&self, metrics: QualityMetrics) -> RefineResult<()> {
        let mut history = self.history.write().map_err(poisoned("quality history"))?;
        if history.len() >= self.config.max_history {
            history.pop_front();
        }
        debug!(
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            samples = history.len() + 1,
            "Quality metrics recorded"
        );
        history.push_back(metrics);
        Ok(())
    }

    /// History, oldest first.
    pub fn history(&self) -> RefineResult<Vec<QualityMetrics>> {
        let history = self.history.read().map_err(poisoned("quality history"))?;
        Ok(history.iter().cloned().collect())
    }

    pub fn latest(&self) -> RefineResult<Option<QualityMetrics>> {
        let history = self.history.read().map_err(poisoned("quality history"))?;
        Ok(history.back().cloned())
    }

    pub fn len(&self) -> RefineResult<usize> {
        Ok(self.history.read().map_err(poisoned("quality history"))?.len())
    }

    pub fn is_empty(&self) -> RefineResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn clear(&self) -> RefineResult<()> {
        self.history.write().map_err(poisoned("quality history"))?.clear();
        Ok(())
    }

    /// Trends of precision, recall and F1 over the history.
    pub fn trends(&self) -> RefineResult<QualityTrends> {
        let history = self.history.read().map_err(poisoned("quality history"))?;
        let series = |f: fn(&QualityMetrics) -> f64| history.iter().map(f).collect::<Vec<_>>();
        Ok(QualityTrends {
            precision: analyze_trend(&series(|m| m.precision)),
            recall: analyze_trend(&series(|m| m.recall)),
            f1_score: analyze_trend(&series(|m| m.f1_score)),
        })
    }

    /// Averages and trends over the history.
    pub fn summary(&self) -> RefineResult<QualitySummary> {
        let trends = self.trends()?;
        let history = self.history.read().map_err(poisoned("quality history"))?;
        Ok(QualitySummary {
            samples: history.len(),
            average_precision: mean(history.iter().map(|m| m.precision)),
            average_recall: mean(history.iter().map(|m| m.recall)),
            average_f1: mean(history.iter().map(|m| m.f1_score)),
            average_confidence_std_dev: mean(history.iter().map(|m| m.confidence_stats.std_dev)),
            average_processing_time_ms: mean(history.iter().map(|m| m.processing_time_ms)),
            precision_trend: trends.precision,
            recall_trend: trends.recall,
            f1_trend: trends.f1_score,
        })
    }

    pub fn recommendations(&self) -> RefineResult<Vec<String>> {
        Ok(recommendations::recommendations(&self.summary()?, &self.config))
    }

    pub fn alerts(&self) -> RefineResult<Vec<QualityAlert>> {
        Ok(recommendations::alerts(&self.summary()?, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_models::{BoundingBox, FilteringConfig};

    fn item(id: &str, name: &str, confidence: f64) -> DetectedItem {
        DetectedItem::new(id, name, confidence, "Misc", BoundingBox::new(0.1, 0.1, 0.2, 0.2))
    }

    fn classifier() -> CategoryClassifier {
        CategoryClassifier::new(&FilteringConfig::default())
    }

    #[test]
    fn test_proxy_counts() {
        let input = vec![
            item("1", "Watch", 0.9),
            item("2", "Sleeve", 0.85),
            item("3", "Lamp", 0.45),
            item("4", "Phone", 0.95),
            item("5", "Hand", 0.95),
        ];
        // Phone removed despite high confidence; Hand removed as ignore-class
        let output = vec![input[0].clone(), input[1].clone(), input[2].clone()];
        let counts = DetectionCounts::estimate(&input, &output, &classifier());
        assert_eq!(
            counts,
            DetectionCounts {
                true_positives: 1,
                false_positives: 2,
                false_negatives: 1,
            }
        );
    }

    #[test]
    fn test_record_and_history_cap() {
        let tracker = QualityMetricsTracker::new(QualityTrackerConfig {
            max_history: 3,
            ..QualityTrackerConfig::default()
        });
        let items = vec![item("1", "Watch", 0.9)];
        for _ in 0..5 {
            tracker
                .record(&items, &items, &classifier(), Duration::from_millis(10))
                .unwrap();
        }
        assert_eq!(tracker.len().unwrap(), 3);
        let latest = tracker.latest().unwrap().unwrap();
        assert_eq!(latest.precision, 1.0);
        assert_eq!(latest.source, MetricSource::HeuristicProxy);
        assert!((latest.processing_time_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch_zeroed() {
        let tracker = QualityMetricsTracker::default();
        let m = tracker.record(&[], &[], &classifier(), Duration::ZERO).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.confidence_stats, ConfidenceStats::default());
    }

    #[test]
    fn test_labeled_counts() {
        let tracker = QualityMetricsTracker::default();
        let counts = DetectionCounts {
            true_positives: 3,
            false_positives: 1,
            false_negatives: 1,
        };
        let m = tracker
            .record_labeled(counts, 5, &[item("1", "Watch", 0.9)], Duration::ZERO)
            .unwrap();
        assert_eq!(m.source, MetricSource::Labeled);
        assert_eq!(m.precision, 0.75);
        assert_eq!(m.recall, 0.75);
    }

    #[test]
    fn test_summary_and_trend() {
        let tracker = QualityMetricsTracker::default();
        for tp in [4, 3, 2, 1] {
            let counts = DetectionCounts {
                true_positives: tp,
                false_positives: 4 - tp,
                false_negatives: 0,
            };
            tracker.record_labeled(counts, 4, &[], Duration::ZERO).unwrap();
        }
        let summary = tracker.summary().unwrap();
        assert_eq!(summary.samples, 4);
        assert!((summary.average_precision - 0.625).abs() < 1e-9);
        assert_eq!(summary.precision_trend.direction, TrendDirection::Declining);
        assert!(!tracker.recommendations().unwrap().is_empty());
        assert!(tracker
            .alerts()
            .unwrap()
            .iter()
            .any(|a| a.metric == "precision_trend"));
    }

    #[test]
    fn test_clones_share_history() {
        let tracker = QualityMetricsTracker::default();
        let handle = tracker.clone();
        handle.record(&[], &[], &classifier(), Duration::ZERO).unwrap();
        assert_eq!(tracker.len().unwrap(), 1);
        tracker.clear().unwrap();
        assert!(handle.is_empty().unwrap());
    }
}
