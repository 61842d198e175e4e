//! Spatial relationship analysis between detections of one image.
//!
//! For every ordered pair the smaller box is the child candidate and the
//! containment ratio is `intersection / child area` (see
//! [`geometry::containment_ratio`]). Two variants exist:
//!
//! - [`analyze`]: records a relationship when the ratio lies strictly inside
//!   `(min_containment, same_object)`. Ratios at or above `same_object` mean
//!   the two boxes describe the same object and are left to the overlap
//!   resolver.
//! - [`analyze_enhanced`]: weights each ratio by the mean confidence of both
//!   items and a category-hierarchy boost, then classifies it as
//!   containment or overlap.
//!
//! Both are O(n²) in the number of items.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use stash_models::DetectedItem;
use tracing::debug;

use crate::category::normalize_category;
use crate::geometry;

/// Kind of spatial relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Child lies mostly inside the parent (ratio > 0.7).
    Containment,
    /// Substantial shared area (ratio > 0.3).
    Overlap,
    /// Minor shared area.
    Partial,
}

impl RelationshipType {
    /// Classify a containment ratio.
    pub fn from_ratio(ratio: f64, containment: f64, overlap: f64) -> Self {
        if ratio > containment {
            Self::Containment
        } else if ratio > overlap {
            Self::Overlap
        } else {
            Self::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Containment => "containment",
            RelationshipType::Overlap => "overlap",
            RelationshipType::Partial => "partial",
        }
    }
}

/// A parent/child relationship between two detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub parent: DetectedItem,
    pub child: DetectedItem,
    /// Index of the parent in the analyzed slice
    pub parent_index: usize,
    /// Index of the child in the analyzed slice
    pub child_index: usize,
    pub containment_ratio: f64,
    pub intersection_area: f64,
    pub confidence: f64,
    pub relationship_type: RelationshipType,
}

/// Thresholds for the basic analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// Ratios at or below this are ignored (default: 0.1)
    pub min_containment: f64,
    /// Ratios at or above this are the same object (default: 0.9)
    pub same_object: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            min_containment: 0.1,
            same_object: 0.9,
        }
    }
}

/// Summary of one analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialStats {
    pub total_items: usize,
    pub relationships: usize,
    pub containment_relationships: usize,
    pub overlap_relationships: usize,
    pub children: usize,
    pub parents_removed: usize,
    pub average_containment_ratio: f64,
}

/// Result of a spatial analysis pass.
#[derive(Debug, Clone, Default)]
pub struct SpatialAnalysis {
    pub relationships: Vec<Relationship>,
    /// All items, children first, then uninvolved items, then parent-only items.
    pub prioritized: Vec<DetectedItem>,
    /// Items that are not a parent in any relationship.
    pub filtered: Vec<DetectedItem>,
    pub stats: SpatialStats,
}

/// True when `child` is the smaller box of the ordered pair. Equal areas go
/// to the later index so each unordered pair yields at most one candidate.
fn is_child_candidate(items: &[DetectedItem], parent: usize, child: usize) -> bool {
    let parent_area = items[parent].area();
    let child_area = items[child].area();
    child_area < parent_area || (child_area == parent_area && child > parent)
}

/// Basic analysis: relationships, prioritized ordering and parent removal.
pub fn analyze(items: &[DetectedItem], config: &SpatialConfig) -> SpatialAnalysis {
    let mut relationships = Vec::new();

    for i in 0..items.len() {
        for j in 0..items.len() {
            if i == j || !is_child_candidate(items, i, j) {
                continue;
            }

            let parent = &items[i];
            let child = &items[j];
            let intersection_area =
                geometry::intersection_area(&parent.bounding_box, &child.bounding_box);
            let ratio = geometry::containment_ratio(&parent.bounding_box, &child.bounding_box);

            if ratio > config.min_containment && ratio < config.same_object {
                relationships.push(Relationship {
                    parent: parent.clone(),
                    child: child.clone(),
                    parent_index: i,
                    child_index: j,
                    containment_ratio: ratio,
                    intersection_area,
                    confidence: ratio,
                    relationship_type: RelationshipType::from_ratio(ratio, 0.7, 0.3),
                });
            }
        }
    }

    build_analysis(items, relationships)
}

/// Assemble ordering, filtering and statistics from a relationship set.
fn build_analysis(items: &[DetectedItem], relationships: Vec<Relationship>) -> SpatialAnalysis {
    let parents: HashSet<usize> = relationships.iter().map(|r| r.parent_index).collect();
    let children: HashSet<usize> = relationships.iter().map(|r| r.child_index).collect();

    let prioritized = prioritize(items, &parents, &children);
    let filtered: Vec<DetectedItem> = items
        .iter()
        .enumerate()
        .filter(|(idx, _)| !parents.contains(idx))
        .map(|(_, item)| item.clone())
        .collect();

    let average_containment_ratio = if relationships.is_empty() {
        0.0
    } else {
        relationships.iter().map(|r| r.containment_ratio).sum::<f64>() / relationships.len() as f64
    };

    let stats = SpatialStats {
        total_items: items.len(),
        relationships: relationships.len(),
        containment_relationships: relationships
            .iter()
            .filter(|r| r.relationship_type == RelationshipType::Containment)
            .count(),
        overlap_relationships: relationships
            .iter()
            .filter(|r| r.relationship_type == RelationshipType::Overlap)
            .count(),
        children: children.len(),
        parents_removed: items.len() - filtered.len(),
        average_containment_ratio,
    };

    debug!(
        total = stats.total_items,
        relationships = stats.relationships,
        parents_removed = stats.parents_removed,
        "Spatial analysis complete"
    );

    SpatialAnalysis {
        relationships,
        prioritized,
        filtered,
        stats,
    }
}

/// Stable ordering: any child role first, no role second, parent-only last.
fn prioritize(
    items: &[DetectedItem],
    parents: &HashSet<usize>,
    children: &HashSet<usize>,
) -> Vec<DetectedItem> {
    let mut ranked: Vec<(u8, usize)> = (0..items.len())
        .map(|idx| {
            let rank = if children.contains(&idx) {
                0
            } else if parents.contains(&idx) {
                2
            } else {
                1
            };
            (rank, idx)
        })
        .collect();
    ranked.sort_by_key(|&(rank, idx)| (rank, idx));
    ranked.into_iter().map(|(_, idx)| items[idx].clone()).collect()
}

/// Category pairs where one kind commonly sits on or inside the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryHierarchy {
    /// (parent category, child category, confidence boost)
    entries: Vec<(String, String, f64)>,
}

impl CategoryHierarchy {
    pub fn new(entries: Vec<(String, String, f64)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(p, c, boost)| (normalize_category(&p), normalize_category(&c), boost))
            .collect();
        Self { entries }
    }

    /// Boost applied when `parent` contains `child`; 1.0 when unrelated.
    pub fn boost(&self, parent_category: &str, child_category: &str) -> f64 {
        let parent = normalize_category(parent_category);
        let child = normalize_category(child_category);
        self.entries
            .iter()
            .find(|(p, c, _)| *p == parent && *c == child)
            .map_or(1.0, |(_, _, boost)| *boost)
    }
}

impl Default for CategoryHierarchy {
    fn default() -> Self {
        let table: &[(&str, &str, f64)] = &[
            ("clothing", "accessories", 1.2),
            ("clothing", "jewelry", 1.2),
            ("clothing", "watches", 1.2),
            ("bags", "accessories", 1.1),
            ("bags", "electronics", 1.1),
            ("furniture", "electronics", 1.1),
            ("furniture", "home_decor", 1.1),
            ("furniture", "books", 1.1),
            ("furniture", "kitchenware", 1.1),
            ("person", "clothing", 1.15),
            ("person", "accessories", 1.15),
        ];
        Self::new(
            table
                .iter()
                .map(|(p, c, b)| (p.to_string(), c.to_string(), *b))
                .collect(),
        )
    }
}

/// Thresholds for the enhanced analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSpatialConfig {
    /// Ratio above which a relationship is containment (default: 0.7)
    pub containment_ratio: f64,
    /// Ratio above which a relationship is overlap (default: 0.3)
    pub overlap_ratio: f64,
    /// Minimum weighted confidence to accept a relationship (default: 0.2)
    pub min_confidence: f64,
    pub hierarchy: CategoryHierarchy,
}

impl Default for EnhancedSpatialConfig {
    fn default() -> Self {
        Self {
            containment_ratio: 0.7,
            overlap_ratio: 0.3,
            min_confidence: 0.2,
            hierarchy: CategoryHierarchy::default(),
        }
    }
}

/// Enhanced analysis with confidence weighting and category hierarchy.
///
/// Unlike [`analyze`] there is no same-object cutoff: a fully enclosed child
/// is exactly the case this variant exists to find.
pub fn analyze_enhanced(items: &[DetectedItem], config: &EnhancedSpatialConfig) -> SpatialAnalysis {
    let mut relationships = Vec::new();

    for i in 0..items.len() {
        for j in 0..items.len() {
            if i == j || !is_child_candidate(items, i, j) {
                continue;
            }

            let parent = &items[i];
            let child = &items[j];
            let ratio = geometry::containment_ratio(&parent.bounding_box, &child.bounding_box);
            let relationship_type =
                RelationshipType::from_ratio(ratio, config.containment_ratio, config.overlap_ratio);
            if relationship_type == RelationshipType::Partial {
                continue;
            }

            let mean_confidence = (parent.confidence + child.confidence) / 2.0;
            let boost = config.hierarchy.boost(&parent.category, &child.category);
            let confidence = (ratio * mean_confidence * boost).min(1.0);
            if confidence < config.min_confidence {
                continue;
            }

            relationships.push(Relationship {
                parent: parent.clone(),
                child: child.clone(),
                parent_index: i,
                child_index: j,
                containment_ratio: ratio,
                intersection_area: geometry::intersection_area(
                    &parent.bounding_box,
                    &child.bounding_box,
                ),
                confidence,
                relationship_type,
            });
        }
    }

    build_analysis(items, relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_models::BoundingBox;

    fn item(id: &str, name: &str, category: &str, bbox: BoundingBox) -> DetectedItem {
        DetectedItem::new(id, name, 0.8, category, bbox)
    }

    #[test]
    fn test_partial_containment_removes_parent() {
        // Child box half inside the parent
        let items = vec![
            item("shelf", "Shelf", "Furniture", BoundingBox::new(0.0, 0.0, 0.6, 0.6)),
            item("book", "Book", "Books", BoundingBox::new(0.5, 0.1, 0.2, 0.2)),
        ];
        let analysis = analyze(&items, &SpatialConfig::default());

        assert_eq!(analysis.relationships.len(), 1);
        let rel = &analysis.relationships[0];
        assert_eq!(rel.parent.id, "shelf");
        assert_eq!(rel.child.id, "book");
        assert!((rel.containment_ratio - 0.5).abs() < 1e-9);
        assert_eq!(rel.relationship_type, RelationshipType::Overlap);

        let filtered: Vec<&str> = analysis.filtered.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(filtered, vec!["book"]);
        assert_eq!(analysis.stats.parents_removed, 1);
    }

    #[test]
    fn test_full_containment_is_same_object() {
        let items = vec![
            item("a", "Jacket", "Clothing", BoundingBox::new(0.0, 0.0, 0.6, 0.6)),
            item("b", "Watch", "Accessories", BoundingBox::new(0.1, 0.1, 0.1, 0.1)),
        ];
        let analysis = analyze(&items, &SpatialConfig::default());
        assert!(analysis.relationships.is_empty());
        assert_eq!(analysis.filtered.len(), 2);
    }

    #[test]
    fn test_children_prioritized() {
        let items = vec![
            item("parent", "Desk", "Furniture", BoundingBox::new(0.0, 0.0, 0.5, 0.5)),
            item("loner", "Lamp", "Home", BoundingBox::new(0.8, 0.8, 0.1, 0.1)),
            item("child", "Laptop", "Electronics", BoundingBox::new(0.4, 0.1, 0.2, 0.2)),
        ];
        let analysis = analyze(&items, &SpatialConfig::default());
        let order: Vec<&str> = analysis.prioritized.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(order, vec!["child", "loner", "parent"]);
    }

    #[test]
    fn test_equal_boxes_yield_single_candidate() {
        let b = BoundingBox::new(0.1, 0.1, 0.4, 0.4);
        let shifted = BoundingBox::new(0.3, 0.1, 0.4, 0.4);
        let items = vec![item("a", "Box", "Misc", b), item("b", "Box", "Misc", shifted)];
        let analysis = analyze(&items, &SpatialConfig::default());
        assert_eq!(analysis.relationships.len(), 1);
        assert_eq!(analysis.relationships[0].parent.id, "a");
        assert_eq!(analysis.filtered.len(), 1);
    }

    #[test]
    fn test_empty_and_single() {
        let empty = analyze(&[], &SpatialConfig::default());
        assert!(empty.relationships.is_empty());
        assert_eq!(empty.stats, SpatialStats::default());

        let single = analyze(
            &[item("a", "Lamp", "Home", BoundingBox::new(0.1, 0.1, 0.2, 0.2))],
            &SpatialConfig::default(),
        );
        assert!(single.relationships.is_empty());
        assert_eq!(single.filtered.len(), 1);
    }

    #[test]
    fn test_degenerate_child_ignored() {
        let items = vec![
            item("a", "Desk", "Furniture", BoundingBox::new(0.0, 0.0, 0.5, 0.5)),
            item("b", "Pen", "Office", BoundingBox::new(0.1, 0.1, 0.0, 0.2)),
        ];
        assert!(analyze(&items, &SpatialConfig::default()).relationships.is_empty());
    }

    #[test]
    fn test_enhanced_finds_full_containment() {
        let items = vec![
            DetectedItem::new("s", "Sleeve", 0.75, "Clothing", BoundingBox::new(0.1, 0.1, 0.4, 0.6)),
            DetectedItem::new("w", "Watch", 0.65, "Accessories", BoundingBox::new(0.2, 0.3, 0.1, 0.1)),
        ];
        let analysis = analyze_enhanced(&items, &EnhancedSpatialConfig::default());
        assert_eq!(analysis.relationships.len(), 1);
        let rel = &analysis.relationships[0];
        assert_eq!(rel.relationship_type, RelationshipType::Containment);
        // 1.0 ratio * 0.7 mean confidence * 1.2 clothing/accessories boost
        assert!((rel.confidence - 0.84).abs() < 1e-9);
    }

    #[test]
    fn test_enhanced_discards_minor_overlap() {
        let items = vec![
            item("a", "Desk", "Furniture", BoundingBox::new(0.0, 0.0, 0.5, 0.5)),
            item("b", "Laptop", "Electronics", BoundingBox::new(0.45, 0.0, 0.2, 0.2)),
        ];
        // Ratio 0.25 is below the overlap bound
        assert!(analyze_enhanced(&items, &EnhancedSpatialConfig::default())
            .relationships
            .is_empty());
    }

    #[test]
    fn test_enhanced_low_confidence_rejected() {
        let items = vec![
            DetectedItem::new("a", "Desk", 0.2, "Furniture", BoundingBox::new(0.0, 0.0, 0.5, 0.5)),
            DetectedItem::new("b", "Cup", 0.1, "Kitchen", BoundingBox::new(0.1, 0.1, 0.1, 0.1)),
        ];
        assert!(analyze_enhanced(&items, &EnhancedSpatialConfig::default())
            .relationships
            .is_empty());
    }

    #[test]
    fn test_hierarchy_lookup_normalizes() {
        let h = CategoryHierarchy::default();
        assert_eq!(h.boost("Clothing", " ACCESSORIES"), 1.2);
        assert_eq!(h.boost("Accessories", "Clothing"), 1.0);
        assert_eq!(h.boost("Furniture", "Home Decor"), 1.1);
    }
}
