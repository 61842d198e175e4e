//! Shared data models for the Stash detection pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Normalized bounding boxes and points
//! - Detected items as produced by the vision-provider adapters
//! - Keyword filtering configuration
//! - User feedback events and image capture context

pub mod bbox;
pub mod feedback;
pub mod filtering;
pub mod image_context;
pub mod item;

// Re-export common types
pub use bbox::{BoundingBox, Point};
pub use feedback::{UserAction, UserFeedback};
pub use filtering::{ConfidenceThresholds, FilteringConfig, KeywordRule, ObjectClass};
pub use image_context::{ImageContext, ImageQuality, LightingCondition};
pub use item::{DetectedItem, DetectionSource, PrecisionLevel, ProviderDetections, SegmentationMask};
