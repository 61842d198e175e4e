//! Context factors applied on top of category thresholds.
//!
//! Each factor stays within roughly [0.8, 1.1]. A factor above 1.0 makes
//! the pipeline stricter.

use serde::{Deserialize, Serialize};
use stash_models::{DetectedItem, ImageContext, ImageQuality, LightingCondition};

/// Multiplicative factors derived from an image and its detections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFactors {
    pub image_quality: f64,
    pub lighting: f64,
    pub item_count: f64,
    pub mean_confidence: f64,
}

impl Default for ContextFactors {
    fn default() -> Self {
        Self {
            image_quality: 1.0,
            lighting: 1.0,
            item_count: 1.0,
            mean_confidence: 1.0,
        }
    }
}

impl ContextFactors {
    /// Derive factors from the capture context and the detections.
    pub fn derive(context: &ImageContext, items: &[DetectedItem]) -> Self {
        let mean_confidence = if items.is_empty() {
            None
        } else {
            Some(items.iter().map(|i| i.confidence).sum::<f64>() / items.len() as f64)
        };

        Self {
            image_quality: quality_factor(context.image_quality),
            lighting: lighting_factor(context.lighting),
            item_count: item_count_factor(items.len()),
            mean_confidence: mean_confidence.map_or(1.0, mean_confidence_factor),
        }
    }

    /// Product of all factors.
    pub fn combined(&self) -> f64 {
        self.image_quality * self.lighting * self.item_count * self.mean_confidence
    }
}

fn quality_factor(quality: ImageQuality) -> f64 {
    match quality {
        ImageQuality::High => 1.1,
        ImageQuality::Medium => 1.0,
        ImageQuality::Low => 0.85,
    }
}

fn lighting_factor(lighting: LightingCondition) -> f64 {
    match lighting {
        LightingCondition::Good => 1.0,
        LightingCondition::Dim => 0.9,
        LightingCondition::Harsh => 0.95,
    }
}

/// Crowded images produce more spurious boxes.
fn item_count_factor(count: usize) -> f64 {
    match count {
        c if c > 15 => 1.1,
        c if c > 8 => 1.05,
        c if c <= 2 => 0.9,
        _ => 1.0,
    }
}

fn mean_confidence_factor(mean: f64) -> f64 {
    if mean > 0.85 {
        1.1
    } else if mean < 0.5 {
        0.8
    } else if mean < 0.65 {
        0.9
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_models::BoundingBox;

    fn items(n: usize, confidence: f64) -> Vec<DetectedItem> {
        (0..n)
            .map(|i| DetectedItem::new(i.to_string(), "Item", confidence, "Misc", BoundingBox::default()))
            .collect()
    }

    #[test]
    fn test_neutral_context() {
        let f = ContextFactors::derive(&ImageContext::default(), &items(5, 0.7));
        assert_eq!(f, ContextFactors::default());
        assert_eq!(f.combined(), 1.0);
    }

    #[test]
    fn test_poor_capture_lowers_bar() {
        let ctx = ImageContext::new(ImageQuality::Low, LightingCondition::Dim);
        let f = ContextFactors::derive(&ctx, &items(2, 0.4));
        assert!(f.combined() < 0.6);
    }

    #[test]
    fn test_crowded_confident_raises_bar() {
        let ctx = ImageContext::new(ImageQuality::High, LightingCondition::Good);
        let f = ContextFactors::derive(&ctx, &items(20, 0.9));
        assert!((f.combined() - 1.1 * 1.1 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_empty_items() {
        let f = ContextFactors::derive(&ImageContext::default(), &[]);
        assert_eq!(f.item_count, 0.9);
        assert_eq!(f.mean_confidence, 1.0);
    }
}
