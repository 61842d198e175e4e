//! Refinement result types.

use serde::{Deserialize, Serialize};
use stash_models::DetectedItem;

use crate::category::FilteringStats;
use crate::contextual::{ContextualScenario, ContextualStats};
use crate::merge::MergeStats;
use crate::overlap::{ConflictStats, OverlapDistribution};
use crate::quality::QualityMetrics;
use crate::spatial::SpatialStats;
use crate::thresholds::ThresholdStats;

/// Wall-clock time per stage, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTimings {
    pub validation_ms: f64,
    pub filtering_ms: f64,
    pub spatial_ms: f64,
    pub overlap_ms: f64,
    pub contextual_ms: f64,
    pub thresholds_ms: f64,
    pub metrics_ms: f64,
    pub total_ms: f64,
}

impl StageTimings {
    /// Stage names paired with their durations, in execution order.
    pub fn stages(&self) -> [(&'static str, f64); 7] {
        [
            ("validation", self.validation_ms),
            ("filtering", self.filtering_ms),
            ("spatial", self.spatial_ms),
            ("overlap", self.overlap_ms),
            ("contextual", self.contextual_ms),
            ("thresholds", self.thresholds_ms),
            ("metrics", self.metrics_ms),
        ]
    }

    /// Slowest stage and its duration.
    pub fn slowest(&self) -> (&'static str, f64) {
        self.stages()
            .into_iter()
            .fold(("validation", f64::NEG_INFINITY), |best, stage| {
                if stage.1 > best.1 {
                    stage
                } else {
                    best
                }
            })
    }
}

/// Outcome of re-applying the session thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicThresholdStats {
    pub applied: bool,
    pub removed: usize,
    pub combined_factor: f64,
    pub thresholds: ThresholdStats,
}

/// Everything measured during one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetrics {
    pub timings: StageTimings,
    pub filtering_stats: FilteringStats,
    pub spatial_stats: SpatialStats,
    pub overlap_stats: OverlapDistribution,
    pub conflict_stats: ConflictStats,
    pub contextual_stats: ContextualStats,
    pub dynamic_threshold_stats: DynamicThresholdStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_stats: Option<MergeStats>,
    pub budget_exceeded: bool,
}

/// Output of one refinement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementResult {
    pub run_id: String,
    pub items: Vec<DetectedItem>,
    pub processing_metrics: ProcessingMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_metrics: Option<QualityMetrics>,
    #[serde(default)]
    pub scenarios: Vec<ContextualScenario>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RefinementResult {
    /// A failed run: no items and zeroed metrics.
    pub fn failed(run_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            items: Vec::new(),
            processing_metrics: ProcessingMetrics::default(),
            quality_metrics: None,
            scenarios: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}
