//! Capture conditions reported alongside an image's detections.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overall sharpness/resolution estimate from the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageQuality {
    High,
    #[default]
    Medium,
    Low,
}

/// Lighting estimate from the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LightingCondition {
    #[default]
    Good,
    Dim,
    Harsh,
}

/// Context for one image. Item count and mean confidence are filled in by
/// the pipeline from the detections themselves.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageContext {
    #[serde(default)]
    pub image_quality: ImageQuality,
    #[serde(default)]
    pub lighting: LightingCondition,
}

impl ImageContext {
    pub fn new(image_quality: ImageQuality, lighting: LightingCondition) -> Self {
        Self {
            image_quality,
            lighting,
        }
    }
}
