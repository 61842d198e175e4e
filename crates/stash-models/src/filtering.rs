//! Keyword-based category filtering configuration.
//!
//! Vision providers return arbitrary free-text labels, so classification is a
//! deliberately loose substring match over a keyword table:
//!
//! | Class | Meaning | Default threshold |
//! |-------|---------|-------------------|
//! | `ObjectsOfInterest` | Items worth cataloguing | 0.5 |
//! | `ObjectsToIgnore` | Body parts, garment regions, surfaces | 0.8 |
//! | `Default` | Anything else | 0.6 |

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Class assigned to a detection by keyword matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    /// Matched an objects-of-interest keyword.
    ObjectsOfInterest,
    /// Matched an objects-to-ignore keyword (and no interest keyword).
    ObjectsToIgnore,
    /// Matched nothing.
    #[default]
    Default,
}

impl ObjectClass {
    pub const ALL: &'static [ObjectClass] = &[
        ObjectClass::ObjectsOfInterest,
        ObjectClass::ObjectsToIgnore,
        ObjectClass::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::ObjectsOfInterest => "objects_of_interest",
            ObjectClass::ObjectsToIgnore => "objects_to_ignore",
            ObjectClass::Default => "default",
        }
    }

    /// Keep-priority used when a stage must fall back to a ranked subset
    /// (higher is kept first).
    pub fn priority(&self) -> u8 {
        match self {
            ObjectClass::ObjectsOfInterest => 3,
            ObjectClass::Default => 2,
            ObjectClass::ObjectsToIgnore => 1,
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectClass {
    type Err = ObjectClassParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "objects_of_interest" | "interest" => Ok(ObjectClass::ObjectsOfInterest),
            "objects_to_ignore" | "ignore" => Ok(ObjectClass::ObjectsToIgnore),
            "default" => Ok(ObjectClass::Default),
            _ => Err(ObjectClassParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown object class: {0}")]
pub struct ObjectClassParseError(String);

/// Per-class confidence cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceThresholds {
    pub objects_of_interest: f64,
    pub objects_to_ignore: f64,
    pub default: f64,
}

impl ConfidenceThresholds {
    /// Threshold configured for a class.
    pub fn for_class(&self, class: ObjectClass) -> f64 {
        match class {
            ObjectClass::ObjectsOfInterest => self.objects_of_interest,
            ObjectClass::ObjectsToIgnore => self.objects_to_ignore,
            ObjectClass::Default => self.default,
        }
    }
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            objects_of_interest: 0.5,
            objects_to_ignore: 0.8,
            default: 0.6,
        }
    }
}

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordRule {
    pub keyword: String,
    pub class: ObjectClass,
}

impl KeywordRule {
    pub fn new(keyword: impl Into<String>, class: ObjectClass) -> Self {
        Self {
            keyword: keyword.into(),
            class,
        }
    }
}

/// Keywords that mark an item as worth cataloguing.
pub const DEFAULT_OBJECTS_OF_INTEREST: &[&str] = &[
    "watch", "ring", "necklace", "bracelet", "earring", "jewelry", "jewellery", "pendant",
    "phone", "laptop", "tablet", "camera", "headphone", "earbud", "speaker", "console",
    "handbag", "purse", "wallet", "backpack", "luggage", "suitcase", "bag",
    "shoe", "sneaker", "boot", "sunglasses", "glasses", "hat",
    "guitar", "instrument", "painting", "artwork", "sculpture", "vase", "lamp",
    "chair", "sofa", "couch", "book", "bottle", "bicycle", "toy",
];

/// Keywords for regions that are almost never catalogue items on their own.
pub const DEFAULT_OBJECTS_TO_IGNORE: &[&str] = &[
    "sleeve", "collar", "cuff", "hand", "arm", "wrist", "finger", "person", "face", "skin",
    "hair", "leg", "human body", "wall", "floor", "ceiling", "sky", "shadow", "textile",
    "pattern", "fabric",
];

/// Filtering configuration: two keyword lists and three thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilteringConfig {
    pub objects_of_interest: Vec<String>,
    pub objects_to_ignore: Vec<String>,
    pub confidence_thresholds: ConfidenceThresholds,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            objects_of_interest: DEFAULT_OBJECTS_OF_INTEREST.iter().map(|s| s.to_string()).collect(),
            objects_to_ignore: DEFAULT_OBJECTS_TO_IGNORE.iter().map(|s| s.to_string()).collect(),
            confidence_thresholds: ConfidenceThresholds::default(),
        }
    }
}

/// Serialized form of a keyword table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct RuleTable {
    rules: Vec<KeywordRule>,
    #[serde(default)]
    confidence_thresholds: Option<ConfidenceThresholds>,
}

impl FilteringConfig {
    /// Keyword table in match order: interest keywords first, then ignore
    /// keywords. Keywords are lowercased; blank entries are dropped.
    pub fn keyword_table(&self) -> Vec<KeywordRule> {
        let interest = self
            .objects_of_interest
            .iter()
            .map(|k| (k, ObjectClass::ObjectsOfInterest));
        let ignore = self
            .objects_to_ignore
            .iter()
            .map(|k| (k, ObjectClass::ObjectsToIgnore));

        interest
            .chain(ignore)
            .filter_map(|(k, class)| {
                let keyword = k.trim().to_lowercase();
                (!keyword.is_empty()).then(|| KeywordRule::new(keyword, class))
            })
            .collect()
    }

    /// Build a config from a keyword table.
    ///
    /// Rules with class `Default` carry no meaning and are skipped.
    pub fn from_rules(rules: &[KeywordRule], confidence_thresholds: ConfidenceThresholds) -> Self {
        let mut config = Self {
            objects_of_interest: Vec::new(),
            objects_to_ignore: Vec::new(),
            confidence_thresholds,
        };
        for rule in rules {
            match rule.class {
                ObjectClass::ObjectsOfInterest => config.objects_of_interest.push(rule.keyword.clone()),
                ObjectClass::ObjectsToIgnore => config.objects_to_ignore.push(rule.keyword.clone()),
                ObjectClass::Default => {}
            }
        }
        config
    }

    /// Load a config from a JSON keyword table:
    ///
    /// ```json
    /// { "rules": [{ "keyword": "watch", "class": "objects_of_interest" }],
    ///   "confidenceThresholds": { "objectsOfInterest": 0.5, "objectsToIgnore": 0.8, "default": 0.6 } }
    /// ```
    ///
    /// Missing thresholds fall back to the defaults.
    pub fn from_rules_json(json: &str) -> Result<Self, serde_json::Error> {
        let table: RuleTable = serde_json::from_str(json)?;
        Ok(Self::from_rules(
            &table.rules,
            table.confidence_thresholds.unwrap_or_default(),
        ))
    }
}
