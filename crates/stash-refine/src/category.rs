//! Category classification and per-class confidence filtering.
//!
//! Classification is a case-insensitive substring match against the keyword
//! table built from `FilteringConfig`. Interest keywords are checked first,
//! so "handbag" (matches "hand" and "handbag") is an object of interest.

use serde::{Deserialize, Serialize};
use stash_models::{ConfidenceThresholds, DetectedItem, FilteringConfig, KeywordRule, ObjectClass};
use tracing::debug;

/// Aggregate counts from one filtering pass. `filtered + kept == total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringStats {
    pub total: usize,
    pub objects_of_interest: usize,
    pub objects_to_ignore: usize,
    pub default: usize,
    pub filtered: usize,
    pub kept: usize,
}

/// Items surviving the confidence filter plus statistics.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub items: Vec<DetectedItem>,
    pub stats: FilteringStats,
}

/// Keyword classifier with the table precomputed from a config.
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    rules: Vec<KeywordRule>,
    thresholds: ConfidenceThresholds,
}

impl CategoryClassifier {
    pub fn new(config: &FilteringConfig) -> Self {
        Self {
            rules: config.keyword_table(),
            thresholds: config.confidence_thresholds,
        }
    }

    /// Classify a detection name. First matching rule wins.
    pub fn classify(&self, name: &str) -> ObjectClass {
        let name = name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| name.contains(rule.keyword.as_str()))
            .map_or(ObjectClass::Default, |rule| rule.class)
    }

    /// Confidence threshold for an item's class.
    pub fn threshold(&self, item: &DetectedItem) -> f64 {
        self.thresholds.for_class(self.classify(&item.name))
    }

    /// Keep items whose confidence reaches their class threshold.
    pub fn filter(&self, items: &[DetectedItem]) -> FilterOutcome {
        let mut stats = FilteringStats {
            total: items.len(),
            ..FilteringStats::default()
        };
        let mut kept = Vec::with_capacity(items.len());

        for item in items {
            let class = self.classify(&item.name);
            match class {
                ObjectClass::ObjectsOfInterest => stats.objects_of_interest += 1,
                ObjectClass::ObjectsToIgnore => stats.objects_to_ignore += 1,
                ObjectClass::Default => stats.default += 1,
            }

            let threshold = self.thresholds.for_class(class);
            if item.confidence >= threshold {
                kept.push(item.clone());
            } else {
                debug!(
                    item_id = %item.id,
                    name = %item.name,
                    class = %class,
                    confidence = item.confidence,
                    threshold,
                    "Dropped sub-threshold detection"
                );
            }
        }

        stats.kept = kept.len();
        stats.filtered = stats.total - stats.kept;

        FilterOutcome { items: kept, stats }
    }
}

/// Normalize a free-text category label into a lookup key:
/// lowercase, trimmed, inner whitespace and dashes collapsed to `_`.
pub fn normalize_category(category: &str) -> String {
    category
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Classify `name` against `config`.
pub fn classify(name: &str, config: &FilteringConfig) -> ObjectClass {
    CategoryClassifier::new(config).classify(name)
}

/// Threshold for `item` under `config`.
pub fn threshold(item: &DetectedItem, config: &FilteringConfig) -> f64 {
    CategoryClassifier::new(config).threshold(item)
}

/// Filter `items` under `config`.
pub fn filter(items: &[DetectedItem], config: &FilteringConfig) -> FilterOutcome {
    CategoryClassifier::new(config).filter(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_models::BoundingBox;

    fn item(id: &str, name: &str, confidence: f64, category: &str) -> DetectedItem {
        DetectedItem::new(id, name, confidence, category, BoundingBox::new(0.1, 0.1, 0.2, 0.2))
    }

    #[test]
    fn test_classify_case_insensitive() {
        let config = FilteringConfig::default();
        assert_eq!(classify("Wrist WATCH", &config), ObjectClass::ObjectsOfInterest);
        assert_eq!(classify("Sleeve", &config), ObjectClass::ObjectsToIgnore);
        assert_eq!(classify("Table", &config), ObjectClass::Default);
    }

    #[test]
    fn test_interest_wins_tie() {
        let config = FilteringConfig::default();
        // "handbag" contains both "hand" (ignore) and "handbag" (interest)
        assert_eq!(classify("Leather handbag", &config), ObjectClass::ObjectsOfInterest);
        assert_eq!(classify("Armchair", &config), ObjectClass::ObjectsOfInterest);
    }

    #[test]
    fn test_classify_idempotent() {
        let config = FilteringConfig::default();
        for name in ["Watch", "Sleeve", "Table", "", "Human face"] {
            assert_eq!(classify(name, &config), classify(name, &config));
        }
    }

    #[test]
    fn test_watch_sleeve_table_filter() {
        let items = vec![
            item("1", "Watch", 0.65, "Accessories"),
            item("2", "Sleeve", 0.75, "Clothing"),
            item("3", "Table", 0.85, "Furniture"),
        ];
        let outcome = filter(&items, &FilteringConfig::default());
        let names: Vec<&str> = outcome.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Watch", "Table"]);
        assert_eq!(
            outcome.stats,
            FilteringStats {
                total: 3,
                objects_of_interest: 1,
                objects_to_ignore: 1,
                default: 1,
                filtered: 1,
                kept: 2,
            }
        );
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let config = FilteringConfig::default();
        let at = item("1", "Table", 0.6, "Furniture");
        assert_eq!(threshold(&at, &config), 0.6);
        assert_eq!(filter(&[at], &config).stats.kept, 1);
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("  Body Part "), "body_part");
        assert_eq!(normalize_category("Home-Decor"), "home_decor");
        assert_eq!(normalize_category(""), "");
    }

    #[test]
    fn test_empty_input() {
        let outcome = filter(&[], &FilteringConfig::default());
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.stats, FilteringStats::default());
    }

    #[test]
    fn test_stats_balance() {
        let items: Vec<DetectedItem> = (0..20)
            .map(|i| item(&i.to_string(), "Lamp", i as f64 / 20.0, "Home"))
            .collect();
        let stats = filter(&items, &FilteringConfig::default()).stats;
        assert_eq!(stats.filtered + stats.kept, stats.total);
    }
}
