//! Detection refinement for the Stash catalog.
//!
//! This crate takes the raw detections of a vision provider and produces a
//! cleaner list of catalogable items:
//! - Keyword category filtering with per-class confidence thresholds
//! - Spatial containment analysis and redundant-parent removal
//! - Overlap conflict resolution by specificity, confidence and size
//! - Contextual scenarios (accessory worn inside a garment)
//! - Session-scoped adaptive thresholds driven by feedback and quality trends
//! - Heuristic quality metrics, trends, recommendations and alerts
//! - Multi-provider result merging and parallel batch refinement

pub mod category;
pub mod config;
pub mod contextual;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod merge;
pub mod overlap;
pub mod performance;
pub mod pipeline;
pub mod quality;
pub mod spatial;
pub mod telemetry;
pub mod thresholds;

// Re-export common types
pub use category::{CategoryClassifier, FilterOutcome, FilteringStats};
pub use config::{ConfigOverrides, PipelineConfig};
pub use contextual::{ContextualConfig, ContextualFilter, ContextualOutcome, ContextualScenario, ContextualStats};
pub use error::{RefineError, RefineResult};
pub use geometry::OverlapMetrics;
pub use logging::{init_tracing, RunLogger};
pub use merge::{merge_provider_results, MergeOutcome, MergeStats};
pub use overlap::{resolve_conflicts, ConflictDecision, ConflictResolution, ConflictStats, OverlapDistribution};
pub use performance::{
    InMemoryPerformanceMonitor, NoopPerformanceMonitor, OptimizationRequest, PerformanceMetric,
    PerformanceMonitor,
};
pub use pipeline::{
    DynamicThresholdStats, ImageInput, PipelineBuilder, ProcessingMetrics, RefinementPipeline,
    RefinementResult, StageTimings,
};
pub use quality::{
    AlertSeverity, MetricSource, QualityAlert, QualityMetrics, QualityMetricsTracker, QualitySummary,
    QualityTrackerConfig, Trend, TrendDirection,
};
pub use spatial::{
    CategoryHierarchy, EnhancedSpatialConfig, Relationship, RelationshipType, SpatialAnalysis,
    SpatialConfig, SpatialStats,
};
pub use thresholds::{AdaptiveThresholdManager, ContextFactors, ThresholdManagerConfig, ThresholdStats};

// Data models
pub use stash_models::{
    BoundingBox, DetectedItem, FilteringConfig, ImageContext, ProviderDetections, UserAction,
    UserFeedback,
};
