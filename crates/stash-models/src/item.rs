//! Detected item records produced by the vision-provider adapters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::bbox::{BoundingBox, Point};

/// Segmentation data attached to a detection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationMask {
    /// Polygon outline in normalized coordinates.
    #[serde(default)]
    pub polygon: Vec<Point>,
    /// Provider-encoded pixel mask (opaque to the pipeline).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_mask: Option<String>,
}

impl SegmentationMask {
    /// Mask made of a polygon outline only.
    pub fn from_polygon(polygon: Vec<Point>) -> Self {
        Self {
            polygon,
            encoded_mask: None,
        }
    }

    /// True when the mask carries neither a polygon nor pixel data.
    pub fn is_empty(&self) -> bool {
        self.polygon.is_empty() && self.encoded_mask.as_deref().map_or(true, str::is_empty)
    }
}

/// How precisely a detection outlines its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionLevel {
    /// Bounding box only.
    #[default]
    Low,
    /// Coarse polygon outline.
    Medium,
    /// Detailed polygon or pixel mask.
    High,
}

impl PrecisionLevel {
    /// Derive the precision level from mask quality.
    ///
    /// A pixel mask or a polygon with at least 8 vertices is `High`, a
    /// polygon with at least 4 vertices is `Medium`, anything else is `Low`.
    pub fn from_mask(mask: Option<&SegmentationMask>) -> Self {
        match mask {
            Some(m) if m.encoded_mask.as_deref().is_some_and(|s| !s.is_empty()) => Self::High,
            Some(m) if m.polygon.len() >= 8 => Self::High,
            Some(m) if m.polygon.len() >= 4 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrecisionLevel::Low => "low",
            PrecisionLevel::Medium => "medium",
            PrecisionLevel::High => "high",
        }
    }
}

impl fmt::Display for PrecisionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which provider call produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Localized object with a real bounding box.
    #[default]
    ObjectLocalization,
    /// Image-level label; the box is usually the whole frame.
    LabelDetection,
    /// Synthesized by the app shell when providers returned nothing usable.
    Fallback,
}

impl DetectionSource {
    pub const ALL: &'static [DetectionSource] = &[
        DetectionSource::ObjectLocalization,
        DetectionSource::LabelDetection,
        DetectionSource::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::ObjectLocalization => "object_localization",
            DetectionSource::LabelDetection => "label_detection",
            DetectionSource::Fallback => "fallback",
        }
    }

    /// Preference when two providers report the same object (higher wins).
    pub fn geometry_rank(&self) -> u8 {
        match self {
            DetectionSource::ObjectLocalization => 3,
            DetectionSource::LabelDetection => 2,
            DetectionSource::Fallback => 1,
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DetectionSource {
    type Err = DetectionSourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "object_localization" | "objectlocalization" | "object" => {
                Ok(DetectionSource::ObjectLocalization)
            }
            "label_detection" | "labeldetection" | "label" => Ok(DetectionSource::LabelDetection),
            "fallback" => Ok(DetectionSource::Fallback),
            _ => Err(DetectionSourceParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown detection source: {0}")]
pub struct DetectionSourceParseError(String);

/// A single detection returned by a vision provider for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectedItem {
    /// Provider-unique identifier
    pub id: String,
    /// Free-text label, e.g. "Watch"
    pub name: String,
    /// Detection confidence (0.0-1.0)
    pub confidence: f64,
    /// Free-text category label, e.g. "Accessories"
    pub category: String,
    pub bounding_box: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation_mask: Option<SegmentationMask>,
    #[serde(default)]
    pub precision_level: PrecisionLevel,
    #[serde(default)]
    pub source: DetectionSource,
}

impl DetectedItem {
    /// Create a box-only detection from the object localization provider.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        confidence: f64,
        category: impl Into<String>,
        bounding_box: BoundingBox,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            confidence: clamp_unit(confidence),
            category: category.into(),
            bounding_box,
            segmentation_mask: None,
            precision_level: PrecisionLevel::Low,
            source: DetectionSource::ObjectLocalization,
        }
    }

    /// Return a copy with a different source.
    pub fn with_source(mut self, source: DetectionSource) -> Self {
        self.source = source;
        self
    }

    /// Return a copy with a segmentation mask; the precision level follows the mask.
    pub fn with_mask(mut self, mask: SegmentationMask) -> Self {
        self.precision_level = PrecisionLevel::from_mask(Some(&mask));
        self.segmentation_mask = Some(mask);
        self
    }

    /// Return a copy with the confidence replaced (clamped to [0, 1]).
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    /// Return a copy with a different id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Bounding-box area in normalized units.
    pub fn area(&self) -> f64 {
        self.bounding_box.width.max(0.0) * self.bounding_box.height.max(0.0)
    }

    /// True when confidence and box coordinates are all finite.
    pub fn is_finite(&self) -> bool {
        self.confidence.is_finite() && self.bounding_box.is_finite()
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// The raw output of one provider for one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDetections {
    /// Provider name for logging, e.g. "google_vision"
    pub provider: String,
    pub items: Vec<DetectedItem>,
}

impl ProviderDetections {
    pub fn new(provider: impl Into<String>, items: Vec<DetectedItem>) -> Self {
        Self {
            provider: provider.into(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(n: usize) -> Vec<Point> {
        (0..n).map(|i| Point::new(i as f64 * 0.01, 0.0)).collect()
    }

    #[test]
    fn test_precision_from_mask() {
        assert_eq!(PrecisionLevel::from_mask(None), PrecisionLevel::Low);
        assert_eq!(
            PrecisionLevel::from_mask(Some(&SegmentationMask::from_polygon(square(3)))),
            PrecisionLevel::Low
        );
        assert_eq!(
            PrecisionLevel::from_mask(Some(&SegmentationMask::from_polygon(square(4)))),
            PrecisionLevel::Medium
        );
        assert_eq!(
            PrecisionLevel::from_mask(Some(&SegmentationMask::from_polygon(square(12)))),
            PrecisionLevel::High
        );
        let encoded = SegmentationMask {
            polygon: Vec::new(),
            encoded_mask: Some("rle:12,4,9".to_string()),
        };
        assert_eq!(PrecisionLevel::from_mask(Some(&encoded)), PrecisionLevel::High);
    }

    #[test]
    fn test_confidence_clamped() {
        let item = DetectedItem::new("a", "Lamp", 1.4, "Home", BoundingBox::default());
        assert_eq!(item.confidence, 1.0);
        assert_eq!(item.with_confidence(-0.2).confidence, 0.0);
    }

    #[test]
    fn test_with_mask_updates_precision() {
        let item = DetectedItem::new("a", "Ring", 0.8, "Jewelry", BoundingBox::default())
            .with_mask(SegmentationMask::from_polygon(square(9)));
        assert_eq!(item.precision_level, PrecisionLevel::High);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            "label_detection".parse::<DetectionSource>().unwrap(),
            DetectionSource::LabelDetection
        );
        assert!("satellite".parse::<DetectionSource>().is_err());
    }

    #[test]
    fn test_item_json_uses_camel_case() {
        let item = DetectedItem::new("a", "Lamp", 0.9, "Home", BoundingBox::new(0.1, 0.1, 0.2, 0.2));
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("boundingBox").is_some());
        assert_eq!(json["source"], "object_localization");
        assert_eq!(json["precisionLevel"], "low");
    }
}
