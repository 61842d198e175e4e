//! Refinement pipeline orchestrator.
//!
//! One run takes the detections of one image through:
//!
//! 1. validation (non-finite values and duplicate ids fail the run)
//! 2. category filter
//! 3. spatial analysis (redundant parents removed, children first)
//! 4. overlap conflict resolution
//! 5. contextual scenario filter
//! 6. session threshold re-application
//! 7. quality metrics recording, which feeds back into the thresholds
//!
//! Every stage is timed. Errors from any stage are caught once, in
//! [`RefinementPipeline::refine_with_context`], and turned into a failed
//! [`RefinementResult`].

mod builder;
mod result;

pub use builder::PipelineBuilder;
pub use result::{DynamicThresholdStats, ProcessingMetrics, RefinementResult, StageTimings};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stash_models::{DetectedItem, ImageContext, ProviderDetections, UserFeedback};
use tracing::{debug, info};

use crate::category::CategoryClassifier;
use crate::config::PipelineConfig;
use crate::contextual::{ContextualFilter, ContextualScenario};
use crate::error::{RefineError, RefineResult};
use crate::logging::RunLogger;
use crate::merge;
use crate::overlap;
use crate::performance::{self, OptimizationRequest, PerformanceMetric, PerformanceMonitor};
use crate::quality::{QualityMetrics, QualityMetricsTracker};
use crate::spatial::{self, SpatialConfig};
use crate::telemetry;
use crate::thresholds::{AdaptiveThresholdManager, ContextFactors};

/// Run `f` and return its output with the elapsed milliseconds.
fn timed<T>(f: impl FnOnce() -> T) -> (T, f64) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed().as_secs_f64() * 1000.0)
}

/// Detections of one image for batch refinement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    pub image_id: String,
    pub items: Vec<DetectedItem>,
    #[serde(default)]
    pub context: ImageContext,
}

/// Reject input the geometric stages cannot handle.
fn validate_items(items: &[DetectedItem]) -> RefineResult<()> {
    let mut ids = HashSet::with_capacity(items.len());
    for item in items {
        if !item.confidence.is_finite() {
            return Err(RefineError::non_finite(&item.id, "confidence"));
        }
        if !item.bounding_box.is_finite() {
            return Err(RefineError::non_finite(&item.id, "bounding_box"));
        }
        if !ids.insert(item.id.as_str()) {
            return Err(RefineError::invalid_input(format!("duplicate item id {}", item.id)));
        }
    }
    Ok(())
}

/// The detection refinement pipeline.
///
/// Holds per-session state by handle; cloning the pipeline shares the
/// threshold manager, quality tracker and monitor.
#[derive(Clone)]
pub struct RefinementPipeline {
    config: PipelineConfig,
    classifier: CategoryClassifier,
    contextual: ContextualFilter,
    thresholds: AdaptiveThresholdManager,
    quality: QualityMetricsTracker,
    monitor: Arc<dyn PerformanceMonitor>,
}

impl std::fmt::Debug for RefinementPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementPipeline")
            .field("config", &self.config)
            .field("thresholds", &self.thresholds)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl RefinementPipeline {
    /// Pipeline with default configuration and fresh session state.
    pub fn with_defaults() -> Self {
        PipelineBuilder::new().build_unchecked()
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn threshold_manager(&self) -> &AdaptiveThresholdManager {
        &self.thresholds
    }

    pub fn quality_tracker(&self) -> &QualityMetricsTracker {
        &self.quality
    }

    /// Forward user feedback to the threshold manager.
    pub fn record_feedback(&self, feedback: UserFeedback) -> RefineResult<Option<f64>> {
        self.thresholds.record_feedback(feedback)
    }

    /// Refine one image's detections with a neutral capture context.
    pub fn refine(&self, items: &[DetectedItem]) -> RefinementResult {
        self.refine_with_context("unknown", items, &ImageContext::default())
    }

    /// Refine one image's detections. Never fails; errors are reported in
    /// the result.
    pub fn refine_with_context(
        &self,
        image_id: &str,
        items: &[DetectedItem],
        context: &ImageContext,
    ) -> RefinementResult {
        let logger = RunLogger::new(image_id);
        let span = logger.create_span();
        let _enter = span.enter();
        logger.log_start(items.len());

        match self.run(&logger, items, context) {
            Ok(result) => {
                let timings = &result.processing_metrics.timings;
                telemetry::record_run(true, items.len(), result.items.len(), timings.total_ms / 1000.0);
                logger.log_completion(items.len(), result.items.len(), timings.total_ms);
                result
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                telemetry::record_failure(e.kind());
                telemetry::record_run(false, items.len(), 0, 0.0);
                RefinementResult::failed(logger.run_id(), e.to_string())
            }
        }
    }

    /// Merge per-provider detections, then refine the merged list.
    pub fn refine_provider_results(
        &self,
        image_id: &str,
        results: &[ProviderDetections],
        context: &ImageContext,
    ) -> RefinementResult {
        let merged = merge::merge_provider_results(results);
        let mut result = self.refine_with_context(image_id, &merged.items, context);
        if result.success {
            result.processing_metrics.merge_stats = Some(merged.stats);
        }
        result
    }

    /// Refine independent images in parallel. Results keep input order.
    pub fn refine_batch(&self, images: &[ImageInput]) -> Vec<RefinementResult> {
        let (results, elapsed_ms): (Vec<RefinementResult>, f64) = timed(|| {
            images
                .par_iter()
                .map(|image| self.refine_with_context(&image.image_id, &image.items, &image.context))
                .collect()
        });

        info!(
            images = images.len(),
            failed = results.iter().filter(|r| !r.success).count(),
            elapsed_ms,
            "Batch refinement completed"
        );
        performance::dispatch(
            Arc::clone(&self.monitor),
            vec![PerformanceMetric::Parallel {
                operation: "refine_batch".to_string(),
                tasks: images.len(),
                duration_ms: elapsed_ms,
            }],
            None,
        );
        results
    }

    fn run(
        &self,
        logger: &RunLogger,
        input: &[DetectedItem],
        context: &ImageContext,
    ) -> RefineResult<RefinementResult> {
        let run_start = Instant::now();
        let mut metrics = ProcessingMetrics::default();

        let (validation, ms) = timed(|| validate_items(input));
        validation?;
        metrics.timings.validation_ms = ms;

        if input.is_empty() {
            metrics.timings.total_ms = run_start.elapsed().as_secs_f64() * 1000.0;
            debug!(run_id = logger.run_id(), "Empty input; nothing to refine");
            return Ok(Self::assemble(logger, Vec::new(), metrics, None, Vec::new()));
        }

        // Category filter
        let (filtered, ms) = timed(|| self.classifier.filter(input));
        metrics.timings.filtering_ms = ms;
        metrics.filtering_stats = filtered.stats;
        logger.log_stage("filtering", input.len(), filtered.items.len(), ms);

        // Spatial analysis
        let spatial_config = SpatialConfig {
            min_containment: self.config.spatial_containment_threshold,
            same_object: self.config.spatial_same_object_threshold,
        };
        let (current, ms) = timed(|| {
            let analysis = spatial::analyze(&filtered.items, &spatial_config);
            metrics.spatial_stats = analysis.stats;
            let keep: HashSet<&str> = analysis.filtered.iter().map(|i| i.id.as_str()).collect();
            analysis
                .prioritized
                .iter()
                .filter(|i| keep.contains(i.id.as_str()))
                .cloned()
                .collect::<Vec<_>>()
        });
        metrics.timings.spatial_ms = ms;
        logger.log_stage("spatial", filtered.items.len(), current.len(), ms);

        // Overlap resolution
        let before = current.len();
        let (current, ms) = timed(|| {
            metrics.overlap_stats = overlap::overlap_distribution(&current);
            let resolution = overlap::resolve_conflicts(&current, self.config.overlap_threshold);
            metrics.conflict_stats = resolution.stats;
            resolution.resolved_items
        });
        metrics.timings.overlap_ms = ms;
        logger.log_stage("overlap", before, current.len(), ms);

        // Contextual scenarios
        let mut scenarios = Vec::new();
        let current = if self.config.enable_contextual_filter {
            let before = current.len();
            let (outcome, ms) = timed(|| self.contextual.apply(&current));
            metrics.timings.contextual_ms = ms;
            metrics.contextual_stats = outcome.stats;
            if outcome.stats.fallback_applied {
                telemetry::record_fallback();
                logger.log_warning("contextual filter fell back to priority subset");
            }
            scenarios = outcome.scenarios;
            logger.log_stage("contextual", before, outcome.items.len(), ms);
            outcome.items
        } else {
            current
        };

        // Session thresholds
        let current = if self.config.enable_dynamic_thresholds {
            let before = current.len();
            let (outcome, ms) = timed(|| {
                let factors = ContextFactors::derive(context, &current);
                self.thresholds.apply(&current, &factors)
            });
            let outcome = outcome?;
            metrics.timings.thresholds_ms = ms;
            metrics.dynamic_threshold_stats = DynamicThresholdStats {
                applied: true,
                removed: outcome.removed,
                combined_factor: outcome.combined_factor,
                thresholds: self.thresholds.stats()?,
            };
            logger.log_stage("thresholds", before, outcome.items.len(), ms);
            outcome.items
        } else {
            current
        };

        // Quality metrics, fed back into the thresholds
        let quality_metrics = if self.config.enable_quality_tracking {
            let elapsed = run_start.elapsed();
            let (recorded, ms) = timed(|| -> RefineResult<_> {
                let recorded = self.quality.record(input, &current, &self.classifier, elapsed)?;
                if self.config.enable_dynamic_thresholds {
                    self.thresholds.adjust_from_metrics(&self.quality.history()?)?;
                }
                Ok(recorded)
            });
            let recorded = recorded?;
            metrics.timings.metrics_ms = ms;
            telemetry::set_quality(recorded.precision, recorded.recall);
            Some(recorded)
        } else {
            None
        };

        metrics.timings.total_ms = run_start.elapsed().as_secs_f64() * 1000.0;
        for (stage, ms) in metrics.timings.stages() {
            telemetry::record_stage_duration(stage, ms / 1000.0);
        }
        metrics.budget_exceeded = self.check_budget(logger, &metrics.timings, input.len());

        Ok(Self::assemble(logger, current, metrics, quality_metrics, scenarios))
    }

    fn assemble(
        logger: &RunLogger,
        items: Vec<DetectedItem>,
        processing_metrics: ProcessingMetrics,
        quality_metrics: Option<QualityMetrics>,
        scenarios: Vec<ContextualScenario>,
    ) -> RefinementResult {
        RefinementResult {
            run_id: logger.run_id().to_string(),
            items,
            processing_metrics,
            quality_metrics,
            scenarios,
            success: true,
            error: None,
        }
    }

    /// Flag a budget overrun and ask the monitor to optimize.
    fn check_budget(&self, logger: &RunLogger, timings: &StageTimings, item_count: usize) -> bool {
        let budget_ms = self.config.performance_budget_ms;
        if timings.total_ms <= budget_ms as f64 {
            return false;
        }

        let (slowest, slowest_ms) = timings.slowest();
        logger.log_warning(&format!(
            "run took {:.1}ms, over the {}ms budget (slowest stage: {})",
            timings.total_ms, budget_ms, slowest
        ));
        telemetry::record_budget_overrun();

        let share_of_total = if timings.total_ms > 0.0 {
            slowest_ms / timings.total_ms
        } else {
            0.0
        };
        performance::dispatch(
            Arc::clone(&self.monitor),
            vec![
                PerformanceMetric::Bottleneck {
                    stage: slowest.to_string(),
                    duration_ms: slowest_ms,
                    share_of_total,
                },
                PerformanceMetric::Optimization {
                    reason: "performance_budget_exceeded".to_string(),
                    total_ms: timings.total_ms,
                    budget_ms,
                },
            ],
            Some(OptimizationRequest {
                run_id: logger.run_id().to_string(),
                total_ms: timings.total_ms,
                budget_ms,
                item_count,
                slowest_stage: Some(slowest.to_string()),
            }),
        );
        true
    }
}
