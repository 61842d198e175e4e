//! Overlap conflict resolution.
//!
//! Two detections conflict when their overlap percentage reaches the
//! configured threshold. Each conflict is settled by comparing
//! `specificity + size_priority` for both sides:
//!
//! - specificity: weighted category specificity, name descriptiveness and
//!   confidence, capped at 1.0
//! - size priority: `1 - percentile rank of box area`, so smaller boxes win
//!
//! Conflicts are handled from the most to the least severe. Once an item has
//! won or lost a conflict it takes no part in later ones.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use stash_models::DetectedItem;
use tracing::debug;

use crate::category::normalize_category;
use crate::geometry::{self, OverlapMetrics};

/// Weights of the specificity components.
const CATEGORY_WEIGHT: f64 = 0.4;
const NAME_WEIGHT: f64 = 0.3;
const CONFIDENCE_WEIGHT: f64 = 0.3;

/// Default overlap percentage at which two items conflict.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.1;

/// How specific a category label is (0.0-1.0).
pub fn category_specificity(category: &str) -> f64 {
    match normalize_category(category).as_str() {
        "" | "object" | "objects" | "item" | "items" | "thing" | "other" | "misc" | "unknown" => 0.2,
        "clothing" | "apparel" | "furniture" | "home" | "household" | "person" | "people"
        | "kitchen" | "outdoor" | "body_part" => 0.4,
        "accessories" | "jewelry" | "jewellery" | "watches" | "electronics" | "books" | "toys"
        | "footwear" | "bags" | "kitchenware" | "home_decor" | "instruments" | "art"
        | "collectibles" | "sports_equipment" => 0.8,
        _ => 0.5,
    }
}

/// Descriptiveness of a name: more words and characters score higher.
fn name_specificity(name: &str) -> f64 {
    let words = name.split_whitespace().count() as f64;
    let chars = name.trim().chars().count() as f64;
    0.5 * (words / 3.0).min(1.0) + 0.5 * (chars / 20.0).min(1.0)
}

/// Specificity score of a detection, capped at 1.0.
pub fn specificity_score(item: &DetectedItem) -> f64 {
    let score = CATEGORY_WEIGHT * category_specificity(&item.category)
        + NAME_WEIGHT * name_specificity(&item.name)
        + CONFIDENCE_WEIGHT * item.confidence;
    score.min(1.0)
}

/// Size priority of every item relative to the others (smaller is higher).
pub fn size_priority_scores(items: &[DetectedItem]) -> Vec<f64> {
    let areas: Vec<f64> = items.iter().map(DetectedItem::area).collect();
    geometry::area_percentile_ranks(&areas)
        .into_iter()
        .map(|rank| 1.0 - rank)
        .collect()
}

/// A pair of items whose overlap reached the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapConflict {
    pub first_index: usize,
    pub second_index: usize,
    pub metrics: OverlapMetrics,
}

/// How one conflict was settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDecision {
    pub winner_id: String,
    pub loser_id: String,
    pub overlap_percentage: f64,
    pub winner_score: f64,
    pub loser_score: f64,
}

/// Aggregate conflict metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictStats {
    pub total_conflicts: usize,
    pub resolved_conflicts: usize,
    pub average_overlap_percentage: f64,
}

/// Output of conflict resolution.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolution {
    /// Winners and all non-conflicting items, in input order.
    pub resolved_items: Vec<DetectedItem>,
    /// Losers, in input order.
    pub conflicting_items: Vec<DetectedItem>,
    pub decisions: Vec<ConflictDecision>,
    pub stats: ConflictStats,
}

/// Find every pair whose overlap percentage reaches `threshold`, most severe first.
pub fn find_conflicts(items: &[DetectedItem], threshold: f64) -> Vec<OverlapConflict> {
    let mut conflicts = Vec::new();
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let metrics = geometry::overlap_metrics(&items[i].bounding_box, &items[j].bounding_box);
            if metrics.intersection_area > 0.0 && metrics.overlap_percentage >= threshold {
                conflicts.push(OverlapConflict {
                    first_index: i,
                    second_index: j,
                    metrics,
                });
            }
        }
    }
    // Stable: equal overlaps keep pair enumeration order
    conflicts.sort_by(|a, b| {
        b.metrics
            .overlap_percentage
            .total_cmp(&a.metrics.overlap_percentage)
    });
    conflicts
}

/// Resolve overlap conflicts among `items`.
pub fn resolve_conflicts(items: &[DetectedItem], threshold: f64) -> ConflictResolution {
    let conflicts = find_conflicts(items, threshold);
    let size_priority = size_priority_scores(items);
    let score = |idx: usize| specificity_score(&items[idx]) + size_priority[idx];

    let mut decided: HashSet<usize> = HashSet::new();
    let mut losers: HashSet<usize> = HashSet::new();
    let mut decisions = Vec::new();

    for conflict in &conflicts {
        let (a, b) = (conflict.first_index, conflict.second_index);
        if decided.contains(&a) || decided.contains(&b) {
            continue;
        }

        let (score_a, score_b) = (score(a), score(b));
        // Ties keep the first-encountered item
        let (winner, loser, winner_score, loser_score) = if score_b > score_a {
            (b, a, score_b, score_a)
        } else {
            (a, b, score_a, score_b)
        };

        decided.insert(winner);
        decided.insert(loser);
        losers.insert(loser);
        decisions.push(ConflictDecision {
            winner_id: items[winner].id.clone(),
            loser_id: items[loser].id.clone(),
            overlap_percentage: conflict.metrics.overlap_percentage,
            winner_score,
            loser_score,
        });
    }

    let (conflicting_items, resolved_items): (Vec<_>, Vec<_>) = items
        .iter()
        .enumerate()
        .partition(|(idx, _)| losers.contains(idx));

    let average_overlap_percentage = if conflicts.is_empty() {
        0.0
    } else {
        conflicts
            .iter()
            .map(|c| c.metrics.overlap_percentage)
            .sum::<f64>()
            / conflicts.len() as f64
    };

    let stats = ConflictStats {
        total_conflicts: conflicts.len(),
        resolved_conflicts: decisions.len(),
        average_overlap_percentage,
    };

    debug!(
        total_conflicts = stats.total_conflicts,
        resolved = stats.resolved_conflicts,
        removed = losers.len(),
        "Overlap conflicts resolved"
    );

    ConflictResolution {
        resolved_items: resolved_items.into_iter().map(|(_, i)| i.clone()).collect(),
        conflicting_items: conflicting_items.into_iter().map(|(_, i)| i.clone()).collect(),
        decisions,
        stats,
    }
}

/// Distribution of pairwise overlaps, independent of resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapDistribution {
    pub total_pairs: usize,
    pub overlapping_pairs: usize,
    /// Overlap below 25%
    pub low: usize,
    /// 25% to 50%
    pub medium: usize,
    /// 50% to 75%
    pub high: usize,
    /// 75% and above
    pub complete: usize,
    pub average_overlap_percentage: f64,
    pub max_overlap_percentage: f64,
}

/// Bucket every overlapping pair by overlap percentage.
pub fn overlap_distribution(items: &[DetectedItem]) -> OverlapDistribution {
    let n = items.len();
    let mut dist = OverlapDistribution {
        total_pairs: n * n.saturating_sub(1) / 2,
        ..OverlapDistribution::default()
    };
    let mut sum = 0.0;

    for i in 0..n {
        for j in (i + 1)..n {
            let metrics = geometry::overlap_metrics(&items[i].bounding_box, &items[j].bounding_box);
            if metrics.intersection_area <= 0.0 {
                continue;
            }
            let pct = metrics.overlap_percentage;
            dist.overlapping_pairs += 1;
            sum += pct;
            dist.max_overlap_percentage = dist.max_overlap_percentage.max(pct);
            match pct {
                p if p < 0.25 => dist.low += 1,
                p if p < 0.5 => dist.medium += 1,
                p if p < 0.75 => dist.high += 1,
                _ => dist.complete += 1,
            }
        }
    }

    if dist.overlapping_pairs > 0 {
        dist.average_overlap_percentage = sum / dist.overlapping_pairs as f64;
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_models::BoundingBox;

    fn item(id: &str, name: &str, confidence: f64, category: &str, bbox: BoundingBox) -> DetectedItem {
        DetectedItem::new(id, name, confidence, category, bbox)
    }

    #[test]
    fn test_specificity_capped() {
        let it = item(
            "a",
            "Vintage Rolex Submariner wristwatch",
            1.0,
            "Watches",
            BoundingBox::default(),
        );
        assert!(specificity_score(&it) <= 1.0);
        let generic = item("b", "Object", 0.5, "Object", BoundingBox::default());
        assert!(specificity_score(&generic) < specificity_score(&it));
    }

    #[test]
    fn test_smaller_specific_item_wins() {
        let items = vec![
            item("bag", "Bag", 0.8, "Bags", BoundingBox::new(0.1, 0.1, 0.5, 0.5)),
            item(
                "wallet",
                "Leather wallet",
                0.8,
                "Accessories",
                BoundingBox::new(0.2, 0.2, 0.35, 0.35),
            ),
        ];
        let res = resolve_conflicts(&items, DEFAULT_OVERLAP_THRESHOLD);
        assert_eq!(res.stats.total_conflicts, 1);
        assert_eq!(res.stats.resolved_conflicts, 1);
        assert_eq!(res.resolved_items.len(), 1);
        assert_eq!(res.resolved_items[0].id, "wallet");
        assert_eq!(res.conflicting_items[0].id, "bag");
        assert_eq!(res.decisions[0].winner_id, "wallet");
    }

    #[test]
    fn test_tie_keeps_first() {
        let b1 = BoundingBox::new(0.1, 0.1, 0.4, 0.4);
        let b2 = BoundingBox::new(0.2, 0.1, 0.4, 0.4);
        let items = vec![
            item("first", "Mug", 0.7, "Kitchenware", b1),
            item("second", "Mug", 0.7, "Kitchenware", b2),
        ];
        let res = resolve_conflicts(&items, DEFAULT_OVERLAP_THRESHOLD);
        assert_eq!(res.resolved_items[0].id, "first");
        assert_eq!(res.conflicting_items[0].id, "second");
    }

    #[test]
    fn test_decided_items_not_reconsidered() {
        // A overlaps B heavily and C lightly; after A/B is settled, A/C is skipped
        let items = vec![
            item("a", "Speaker", 0.9, "Electronics", BoundingBox::new(0.1, 0.1, 0.3, 0.3)),
            item("b", "Speaker", 0.5, "Electronics", BoundingBox::new(0.12, 0.12, 0.3, 0.3)),
            item("c", "Cable", 0.9, "Electronics", BoundingBox::new(0.3, 0.3, 0.3, 0.3)),
        ];
        let res = resolve_conflicts(&items, 0.05);
        assert_eq!(res.stats.resolved_conflicts, 1);
        assert!(res.stats.total_conflicts >= 2);
        assert_eq!(res.resolved_items.len() + res.conflicting_items.len(), 3);
        assert_eq!(res.conflicting_items.len(), 1);
    }

    #[test]
    fn test_below_threshold_no_conflict() {
        let items = vec![
            item("a", "Desk", 0.9, "Furniture", BoundingBox::new(0.0, 0.0, 0.5, 0.5)),
            item("b", "Pen", 0.9, "Office", BoundingBox::new(0.45, 0.45, 0.1, 0.1)),
        ];
        let res = resolve_conflicts(&items, DEFAULT_OVERLAP_THRESHOLD);
        assert_eq!(res.stats, ConflictStats::default());
        assert_eq!(res.resolved_items.len(), 2);
    }

    #[test]
    fn test_never_grows() {
        let items: Vec<DetectedItem> = (0..8)
            .map(|i| {
                let o = i as f64 * 0.05;
                item(&i.to_string(), "Box", 0.6, "Misc", BoundingBox::new(o, o, 0.3, 0.3))
            })
            .collect();
        let res = resolve_conflicts(&items, DEFAULT_OVERLAP_THRESHOLD);
        assert!(res.resolved_items.len() + res.conflicting_items.len() <= items.len());
        assert!(!res.resolved_items.is_empty());
    }

    #[test]
    fn test_distribution_buckets() {
        let items = vec![
            item("a", "A", 0.9, "Misc", BoundingBox::new(0.1, 0.1, 0.4, 0.4)),
            item("b", "B", 0.9, "Misc", BoundingBox::new(0.2, 0.2, 0.4, 0.4)),
            item("c", "C", 0.9, "Misc", BoundingBox::new(0.1, 0.1, 0.4, 0.4)),
            item("d", "D", 0.9, "Misc", BoundingBox::new(0.9, 0.9, 0.05, 0.05)),
        ];
        let dist = overlap_distribution(&items);
        assert_eq!(dist.total_pairs, 6);
        assert_eq!(dist.overlapping_pairs, 3);
        // a/b and b/c at ~0.39, a/c identical
        assert_eq!(dist.medium, 2);
        assert_eq!(dist.complete, 1);
        assert!((dist.max_overlap_percentage - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_distribution_empty() {
        assert_eq!(overlap_distribution(&[]), OverlapDistribution::default());
        let one = [item("a", "A", 0.9, "Misc", BoundingBox::new(0.1, 0.1, 0.4, 0.4))];
        assert_eq!(overlap_distribution(&one), OverlapDistribution::default());
    }
}
