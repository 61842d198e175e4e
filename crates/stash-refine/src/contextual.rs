//! Contextual scenario filter.
//!
//! Providers often report both a small accessory and the garment region it
//! sits on (a watch and the sleeve around it). The garment box is rarely a
//! catalogue item, so when an accessory is enclosed by a container region the
//! container is dropped.
//!
//! Order: enhanced spatial analysis, conflict resolution, container removal.
//! If that would leave nothing, the top half of the input (at least one item)
//! by class priority and confidence is kept instead.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use stash_models::DetectedItem;
use tracing::{debug, warn};

use crate::category::CategoryClassifier;
use crate::overlap::{self, DEFAULT_OVERLAP_THRESHOLD};
use crate::spatial::{self, EnhancedSpatialConfig};

/// Small, high-value items that get enclosed by other regions.
pub const DEFAULT_ACCESSORY_KEYWORDS: &[&str] = &[
    "watch", "ring", "bracelet", "necklace", "earring", "jewelry", "jewellery", "pendant",
    "glasses", "sunglasses", "brooch", "cufflink",
];

/// Large, low-specificity regions that enclose accessories.
pub const DEFAULT_CONTAINER_KEYWORDS: &[&str] = &[
    "sleeve", "shirt", "jacket", "coat", "cuff", "arm", "wrist", "hand", "pocket", "collar",
    "clothing", "outerwear",
];

/// Settings for the contextual filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualConfig {
    /// Minimum containment ratio for a scenario (default: 0.5)
    pub containment_threshold: f64,
    /// Overlap threshold used by the internal conflict resolution
    pub overlap_threshold: f64,
    pub accessory_keywords: Vec<String>,
    pub container_keywords: Vec<String>,
    pub spatial: EnhancedSpatialConfig,
}

impl Default for ContextualConfig {
    fn default() -> Self {
        Self {
            containment_threshold: 0.5,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            accessory_keywords: DEFAULT_ACCESSORY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            container_keywords: DEFAULT_CONTAINER_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            spatial: EnhancedSpatialConfig::default(),
        }
    }
}

/// One detected accessory-in-container pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualScenario {
    pub accessory_id: String,
    pub accessory_name: String,
    pub container_id: String,
    pub container_name: String,
    pub containment_ratio: f64,
    pub confidence: f64,
}

impl ContextualScenario {
    fn is_watch_sleeve(&self) -> bool {
        self.accessory_name.to_lowercase().contains("watch")
            && self.container_name.to_lowercase().contains("sleeve")
    }
}

/// Statistics from one contextual pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualStats {
    pub input_count: usize,
    pub output_count: usize,
    pub scenarios_detected: usize,
    pub is_watch_sleeve_scenario: bool,
    pub containers_removed: usize,
    pub conflicts_resolved: usize,
    pub fallback_applied: bool,
}

/// Output of the contextual filter.
#[derive(Debug, Clone, Default)]
pub struct ContextualOutcome {
    pub items: Vec<DetectedItem>,
    pub scenarios: Vec<ContextualScenario>,
    pub stats: ContextualStats,
}

/// Contextual filter bound to a classifier for fallback ranking.
#[derive(Debug, Clone)]
pub struct ContextualFilter {
    config: ContextualConfig,
    classifier: CategoryClassifier,
    accessory: Vec<String>,
    container: Vec<String>,
}

fn lowered(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn matches_any(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords.iter().any(|k| name.contains(k.as_str()))
}

impl ContextualFilter {
    pub fn new(config: ContextualConfig, classifier: CategoryClassifier) -> Self {
        let accessory = lowered(&config.accessory_keywords);
        let container = lowered(&config.container_keywords);
        Self {
            config,
            classifier,
            accessory,
            container,
        }
    }

    pub fn config(&self) -> &ContextualConfig {
        &self.config
    }

    /// Find accessory-in-container scenarios among `items`.
    pub fn detect_scenarios(&self, items: &[DetectedItem]) -> Vec<ContextualScenario> {
        spatial::analyze_enhanced(items, &self.config.spatial)
            .relationships
            .into_iter()
            .filter(|rel| {
                rel.containment_ratio >= self.config.containment_threshold
                    && matches_any(&rel.child.name, &self.accessory)
                    && matches_any(&rel.parent.name, &self.container)
            })
            .map(|rel| ContextualScenario {
                accessory_id: rel.child.id,
                accessory_name: rel.child.name,
                container_id: rel.parent.id,
                container_name: rel.parent.name,
                containment_ratio: rel.containment_ratio,
                confidence: rel.confidence,
            })
            .collect()
    }

    /// Apply scenario detection, conflict resolution and container removal.
    pub fn apply(&self, items: &[DetectedItem]) -> ContextualOutcome {
        let mut stats = ContextualStats {
            input_count: items.len(),
            ..ContextualStats::default()
        };
        if items.is_empty() {
            return ContextualOutcome {
                stats,
                ..ContextualOutcome::default()
            };
        }

        let scenarios = self.detect_scenarios(items);
        stats.scenarios_detected = scenarios.len();
        stats.is_watch_sleeve_scenario = scenarios.iter().any(ContextualScenario::is_watch_sleeve);

        let resolution = overlap::resolve_conflicts(items, self.config.overlap_threshold);
        stats.conflicts_resolved = resolution.stats.resolved_conflicts;

        let containers: HashSet<&str> = scenarios.iter().map(|s| s.container_id.as_str()).collect();
        let before = resolution.resolved_items.len();
        let mut kept: Vec<DetectedItem> = resolution
            .resolved_items
            .into_iter()
            .filter(|item| !containers.contains(item.id.as_str()))
            .collect();
        stats.containers_removed = before - kept.len();

        if kept.is_empty() {
            kept = self.fallback(items);
            stats.fallback_applied = true;
            warn!(
                input = items.len(),
                kept = kept.len(),
                "Contextual filter would remove every item; keeping priority subset"
            );
        }

        stats.output_count = kept.len();
        debug!(
            scenarios = stats.scenarios_detected,
            watch_sleeve = stats.is_watch_sleeve_scenario,
            containers_removed = stats.containers_removed,
            output = stats.output_count,
            "Contextual filter applied"
        );

        ContextualOutcome {
            items: kept,
            scenarios,
            stats,
        }
    }

    /// Top half (at least one) of `items` by class priority, then confidence.
    /// Survivors keep their input order.
    fn fallback(&self, items: &[DetectedItem]) -> Vec<DetectedItem> {
        let keep = items.len().div_ceil(2).max(1);
        let mut ranked: Vec<usize> = (0..items.len()).collect();
        ranked.sort_by(|&a, &b| {
            let pa = self.classifier.classify(&items[a].name).priority();
            let pb = self.classifier.classify(&items[b].name).priority();
            pb.cmp(&pa)
                .then_with(|| items[b].confidence.total_cmp(&items[a].confidence))
        });
        let mut chosen: Vec<usize> = ranked.into_iter().take(keep).collect();
        chosen.sort_unstable();
        chosen.into_iter().map(|idx| items[idx].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_models::{BoundingBox, FilteringConfig};

    fn filter() -> ContextualFilter {
        ContextualFilter::new(
            ContextualConfig::default(),
            CategoryClassifier::new(&FilteringConfig::default()),
        )
    }

    #[test]
    fn test_watch_in_sleeve() {
        let items = vec![
            DetectedItem::new("sleeve", "Sleeve", 0.85, "Clothing", BoundingBox::new(0.1, 0.1, 0.4, 0.6)),
            DetectedItem::new("watch", "Watch", 0.8, "Accessories", BoundingBox::new(0.2, 0.3, 0.1, 0.1)),
        ];
        let outcome = filter().apply(&items);

        assert!(outcome.stats.is_watch_sleeve_scenario);
        assert_eq!(outcome.stats.scenarios_detected, 1);
        assert_eq!(outcome.stats.containers_removed, 1);
        assert!(!outcome.stats.fallback_applied);
        let ids: Vec<&str> = outcome.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["watch"]);
    }

    #[test]
    fn test_unrelated_items_untouched() {
        let items = vec![
            DetectedItem::new("a", "Lamp", 0.9, "Home", BoundingBox::new(0.0, 0.0, 0.2, 0.2)),
            DetectedItem::new("b", "Book", 0.9, "Books", BoundingBox::new(0.5, 0.5, 0.2, 0.2)),
        ];
        let outcome = filter().apply(&items);
        assert_eq!(outcome.items.len(), 2);
        assert!(outcome.scenarios.is_empty());
        assert!(!outcome.stats.is_watch_sleeve_scenario);
    }

    #[test]
    fn test_ring_in_hand_is_not_watch_sleeve() {
        let items = vec![
            DetectedItem::new("hand", "Hand", 0.9, "Body Part", BoundingBox::new(0.2, 0.2, 0.3, 0.3)),
            DetectedItem::new("ring", "Gold ring", 0.9, "Jewelry", BoundingBox::new(0.3, 0.3, 0.05, 0.05)),
        ];
        let outcome = filter().apply(&items);
        assert_eq!(outcome.stats.scenarios_detected, 1);
        assert!(!outcome.stats.is_watch_sleeve_scenario);
        assert_eq!(outcome.items[0].id, "ring");
    }

    #[test]
    fn test_empty_input() {
        let outcome = filter().apply(&[]);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.stats, ContextualStats::default());
    }

    #[test]
    fn test_fallback_ranks_by_priority() {
        let f = filter();
        let items = vec![
            DetectedItem::new("1", "Sleeve", 0.9, "Clothing", BoundingBox::default()),
            DetectedItem::new("2", "Watch", 0.6, "Accessories", BoundingBox::default()),
            DetectedItem::new("3", "Table", 0.7, "Furniture", BoundingBox::default()),
        ];
        let kept = f.fallback(&items);
        let ids: Vec<&str> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let single = f.fallback(&items[..1]);
        assert_eq!(single.len(), 1);
    }
}
