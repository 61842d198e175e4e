//! Builder for refinement pipelines.
//!
//! Session state (threshold manager, quality tracker) is created fresh
//! unless the caller passes existing handles, which is how one session
//! shares its state across several pipelines.

use std::sync::Arc;

use tracing::info;

use super::RefinementPipeline;
use crate::category::CategoryClassifier;
use crate::config::{ConfigOverrides, PipelineConfig};
use crate::contextual::{ContextualConfig, ContextualFilter};
use crate::error::RefineResult;
use crate::performance::{NoopPerformanceMonitor, PerformanceMonitor};
use crate::quality::{QualityMetricsTracker, QualityTrackerConfig};
use crate::thresholds::AdaptiveThresholdManager;

/// Builder for [`RefinementPipeline`].
///
/// # Example
///
/// ```ignore
/// let pipeline = PipelineBuilder::new()
///     .overrides(ConfigOverrides { overlap_threshold: Some(0.2), ..Default::default() })
///     .threshold_manager(session.thresholds.clone())
///     .build()?;
/// let result = pipeline.refine(&items);
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    contextual: Option<ContextualConfig>,
    thresholds: Option<AdaptiveThresholdManager>,
    quality: Option<QualityMetricsTracker>,
    monitor: Option<Arc<dyn PerformanceMonitor>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Merge overrides into the current configuration.
    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.config = self.config.merge(overrides);
        self
    }

    /// Customize the contextual filter's keyword lists and spatial weights.
    /// Its containment and overlap thresholds still come from the config.
    pub fn contextual_config(mut self, contextual: ContextualConfig) -> Self {
        self.contextual = Some(contextual);
        self
    }

    /// Share an existing threshold manager.
    pub fn threshold_manager(mut self, manager: AdaptiveThresholdManager) -> Self {
        self.thresholds = Some(manager);
        self
    }

    /// Share an existing quality tracker.
    pub fn quality_tracker(mut self, tracker: QualityMetricsTracker) -> Self {
        self.quality = Some(tracker);
        self
    }

    pub fn performance_monitor(mut self, monitor: Arc<dyn PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Validate the configuration and build the pipeline.
    pub fn build(self) -> RefineResult<RefinementPipeline> {
        let config = self.config.validated()?;
        Ok(Self { config, ..self }.build_unchecked())
    }

    pub(super) fn build_unchecked(self) -> RefinementPipeline {
        let config = self.config;
        let classifier = CategoryClassifier::new(&config.filtering);

        let mut contextual = self.contextual.unwrap_or_default();
        contextual.containment_threshold = config.contextual_containment_threshold;
        contextual.overlap_threshold = config.overlap_threshold;

        let quality = self.quality.unwrap_or_else(|| {
            QualityMetricsTracker::new(QualityTrackerConfig {
                processing_budget_ms: config.performance_budget_ms,
                ..QualityTrackerConfig::default()
            })
        });

        info!(
            overlap_threshold = config.overlap_threshold,
            budget_ms = config.performance_budget_ms,
            contextual = config.enable_contextual_filter,
            dynamic_thresholds = config.enable_dynamic_thresholds,
            quality_tracking = config.enable_quality_tracking,
            "Building refinement pipeline"
        );

        RefinementPipeline {
            contextual: ContextualFilter::new(contextual, classifier.clone()),
            classifier,
            thresholds: self.thresholds.unwrap_or_default(),
            quality,
            monitor: self.monitor.unwrap_or_else(|| Arc::new(NoopPerformanceMonitor)),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefineError;

    #[test]
    fn test_build_defaults() {
        let pipeline = PipelineBuilder::new().build().unwrap();
        assert_eq!(pipeline.config(), &PipelineConfig::default());
        assert!(pipeline.quality_tracker().is_empty().unwrap());
        assert_eq!(pipeline.threshold_manager().stats().unwrap().history_len, 0);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = PipelineBuilder::new()
            .overrides(ConfigOverrides {
                overlap_threshold: Some(-0.5),
                ..ConfigOverrides::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, RefineError::InvalidConfig(_)));
    }

    #[test]
    fn test_shared_session_state() {
        let manager = AdaptiveThresholdManager::default();
        let pipeline = PipelineBuilder::new()
            .threshold_manager(manager.clone())
            .build()
            .unwrap();
        manager.set_threshold("Books", 0.4).unwrap();
        assert_eq!(pipeline.threshold_manager().threshold("Books").unwrap(), 0.4);
    }

    #[test]
    fn test_contextual_thresholds_follow_config() {
        let pipeline = PipelineBuilder::new()
            .overrides(ConfigOverrides {
                contextual_containment_threshold: Some(0.8),
                ..ConfigOverrides::default()
            })
            .contextual_config(ContextualConfig {
                containment_threshold: 0.1,
                ..ContextualConfig::default()
            })
            .build()
            .unwrap();
        assert_eq!(pipeline.contextual.config().containment_threshold, 0.8);
    }
}
