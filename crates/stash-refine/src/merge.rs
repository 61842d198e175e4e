//! Merging detections from several vision providers.
//!
//! The same physical object is usually reported by more than one provider.
//! Two detections are treated as the same object when their names match
//! (case-insensitive) and their boxes have IoU >= [`DUPLICATE_IOU`]. Fused
//! items keep the higher confidence plus an agreement bonus, the better
//! geometry and the more precise mask.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use stash_models::{DetectedItem, ProviderDetections};
use tracing::debug;

use crate::geometry;

/// IoU at which two same-name detections are one object.
pub const DUPLICATE_IOU: f64 = 0.5;

/// Confidence bonus when independent providers agree.
pub const AGREEMENT_BONUS: f64 = 0.05;

/// Counts from one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub providers: usize,
    pub input_items: usize,
    pub duplicates_merged: usize,
    pub ids_renamed: usize,
    pub output_items: usize,
}

/// Merged detections plus statistics.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub items: Vec<DetectedItem>,
    pub stats: MergeStats,
}

struct Slot {
    item: DetectedItem,
    providers: HashSet<usize>,
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Fuse `incoming` into `existing`.
fn fuse(existing: &mut DetectedItem, incoming: &DetectedItem) {
    let confidence = existing.confidence.max(incoming.confidence) + AGREEMENT_BONUS;

    if incoming.source.geometry_rank() > existing.source.geometry_rank() {
        existing.bounding_box = incoming.bounding_box;
        existing.source = incoming.source;
    }
    if incoming.precision_level > existing.precision_level {
        existing.segmentation_mask = incoming.segmentation_mask.clone();
        existing.precision_level = incoming.precision_level;
    } else if existing.segmentation_mask.is_none() {
        existing.segmentation_mask = incoming.segmentation_mask.clone();
    }
    if existing.category.trim().is_empty() {
        existing.category = incoming.category.clone();
    }

    existing.confidence = confidence.min(1.0);
}

/// Pick an id not already in `used`.
fn unique_id(id: &str, provider: &str, used: &HashSet<String>) -> String {
    if !used.contains(id) {
        return id.to_string();
    }
    let base = format!("{id}-{provider}");
    if !used.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or(base)
}

/// Merge per-provider detections into one list, in first-seen order.
pub fn merge_provider_results(results: &[ProviderDetections]) -> MergeOutcome {
    let mut slots: Vec<Slot> = Vec::new();
    let mut used_ids: HashSet<String> = HashSet::new();
    let mut stats = MergeStats {
        providers: results.len(),
        ..MergeStats::default()
    };

    for (provider_idx, result) in results.iter().enumerate() {
        for item in &result.items {
            stats.input_items += 1;

            let duplicate = slots.iter_mut().find(|slot| {
                !slot.providers.contains(&provider_idx)
                    && same_name(&slot.item.name, &item.name)
                    && geometry::iou(&slot.item.bounding_box, &item.bounding_box) >= DUPLICATE_IOU
            });

            if let Some(slot) = duplicate {
                fuse(&mut slot.item, item);
                slot.providers.insert(provider_idx);
                stats.duplicates_merged += 1;
                continue;
            }

            let id = unique_id(&item.id, &result.provider, &used_ids);
            if id != item.id {
                stats.ids_renamed += 1;
            }
            used_ids.insert(id.clone());
            slots.push(Slot {
                item: item.clone().with_id(id),
                providers: HashSet::from([provider_idx]),
            });
        }
    }

    stats.output_items = slots.len();
    debug!(
        providers = stats.providers,
        input = stats.input_items,
        merged = stats.duplicates_merged,
        output = stats.output_items,
        "Provider results merged"
    );

    MergeOutcome {
        items: slots.into_iter().map(|slot| slot.item).collect(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_models::{BoundingBox, DetectionSource, Point, PrecisionLevel, SegmentationMask};

    fn watch(id: &str, confidence: f64, bbox: BoundingBox) -> DetectedItem {
        DetectedItem::new(id, "Watch", confidence, "Accessories", bbox)
    }

    #[test]
    fn test_cross_provider_duplicate_fused() {
        let label = watch("l1", 0.7, BoundingBox::new(0.2, 0.2, 0.2, 0.2))
            .with_source(DetectionSource::LabelDetection);
        let located = watch("o1", 0.6, BoundingBox::new(0.21, 0.21, 0.2, 0.2));

        let outcome = merge_provider_results(&[
            ProviderDetections::new("labels", vec![label]),
            ProviderDetections::new("objects", vec![located]),
        ]);

        assert_eq!(outcome.items.len(), 1);
        let fused = &outcome.items[0];
        assert_eq!(fused.id, "l1");
        assert!((fused.confidence - 0.75).abs() < 1e-9);
        assert_eq!(fused.source, DetectionSource::ObjectLocalization);
        assert!((fused.bounding_box.x - 0.21).abs() < 1e-9);
        assert_eq!(outcome.stats.duplicates_merged, 1);
    }

    #[test]
    fn test_bonus_capped() {
        let outcome = merge_provider_results(&[
            ProviderDetections::new("a", vec![watch("1", 0.99, BoundingBox::new(0.2, 0.2, 0.2, 0.2))]),
            ProviderDetections::new("b", vec![watch("2", 0.98, BoundingBox::new(0.2, 0.2, 0.2, 0.2))]),
        ]);
        assert_eq!(outcome.items[0].confidence, 1.0);
    }

    #[test]
    fn test_better_mask_kept() {
        let polygon: Vec<Point> = (0..8).map(|i| Point::new(i as f64 * 0.01, 0.1)).collect();
        let masked = watch("m", 0.6, BoundingBox::new(0.2, 0.2, 0.2, 0.2))
            .with_mask(SegmentationMask::from_polygon(polygon));
        let plain = watch("p", 0.8, BoundingBox::new(0.2, 0.2, 0.2, 0.2));

        let outcome = merge_provider_results(&[
            ProviderDetections::new("a", vec![plain]),
            ProviderDetections::new("b", vec![masked]),
        ]);
        let fused = &outcome.items[0];
        assert_eq!(fused.precision_level, PrecisionLevel::High);
        assert!(fused.segmentation_mask.is_some());
    }

    #[test]
    fn test_same_provider_items_not_fused() {
        let outcome = merge_provider_results(&[ProviderDetections::new(
            "a",
            vec![
                watch("1", 0.8, BoundingBox::new(0.2, 0.2, 0.2, 0.2)),
                watch("2", 0.7, BoundingBox::new(0.2, 0.2, 0.2, 0.2)),
            ],
        )]);
        assert_eq!(outcome.items.len(), 2);
    }

    #[test]
    fn test_different_names_not_fused() {
        let outcome = merge_provider_results(&[
            ProviderDetections::new("a", vec![watch("1", 0.8, BoundingBox::new(0.2, 0.2, 0.2, 0.2))]),
            ProviderDetections::new(
                "b",
                vec![DetectedItem::new("2", "Bracelet", 0.8, "Jewelry", BoundingBox::new(0.2, 0.2, 0.2, 0.2))],
            ),
        ]);
        assert_eq!(outcome.items.len(), 2);
    }

    #[test]
    fn test_duplicate_ids_renamed() {
        let outcome = merge_provider_results(&[
            ProviderDetections::new("a", vec![watch("item-0", 0.8, BoundingBox::new(0.0, 0.0, 0.1, 0.1))]),
            ProviderDetections::new(
                "b",
                vec![DetectedItem::new("item-0", "Lamp", 0.8, "Home", BoundingBox::new(0.5, 0.5, 0.2, 0.2))],
            ),
        ]);
        let ids: Vec<&str> = outcome.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["item-0", "item-0-b"]);
        assert_eq!(outcome.stats.ids_renamed, 1);
    }

    #[test]
    fn test_empty() {
        let outcome = merge_provider_results(&[]);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.stats, MergeStats::default());
    }
}
