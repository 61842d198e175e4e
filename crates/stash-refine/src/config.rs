//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use stash_models::FilteringConfig;
use tracing::warn;

use crate::error::{RefineError, RefineResult};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Keyword lists and per-class confidence thresholds
    pub filtering: FilteringConfig,
    /// Containment ratio above which the spatial stage records a relationship
    pub spatial_containment_threshold: f64,
    /// Containment ratio at which two boxes are the same object
    pub spatial_same_object_threshold: f64,
    /// Containment ratio for accessory-in-container scenarios
    pub contextual_containment_threshold: f64,
    /// Overlap percentage at which two items conflict
    pub overlap_threshold: f64,
    /// Total run time above which an optimization is requested
    pub performance_budget_ms: u64,
    pub enable_contextual_filter: bool,
    pub enable_dynamic_thresholds: bool,
    pub enable_quality_tracking: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filtering: FilteringConfig::default(),
            spatial_containment_threshold: 0.1,
            spatial_same_object_threshold: 0.9,
            contextual_containment_threshold: 0.5,
            overlap_threshold: 0.1,
            performance_budget_ms: 3000,
            enable_contextual_filter: true,
            enable_dynamic_thresholds: true,
            enable_quality_tracking: true,
        }
    }
}

/// Partial configuration; every `Some` field replaces the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    pub filtering: Option<FilteringConfig>,
    pub spatial_containment_threshold: Option<f64>,
    pub spatial_same_object_threshold: Option<f64>,
    pub contextual_containment_threshold: Option<f64>,
    pub overlap_threshold: Option<f64>,
    pub performance_budget_ms: Option<u64>,
    pub enable_contextual_filter: Option<bool>,
    pub enable_dynamic_thresholds: Option<bool>,
    pub enable_quality_tracking: Option<bool>,
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl PipelineConfig {
    /// Apply overrides on top of this config.
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(filtering) = overrides.filtering {
            self.filtering = filtering;
        }
        if let Some(v) = overrides.spatial_containment_threshold {
            self.spatial_containment_threshold = v;
        }
        if let Some(v) = overrides.spatial_same_object_threshold {
            self.spatial_same_object_threshold = v;
        }
        if let Some(v) = overrides.contextual_containment_threshold {
            self.contextual_containment_threshold = v;
        }
        if let Some(v) = overrides.overlap_threshold {
            self.overlap_threshold = v;
        }
        if let Some(v) = overrides.performance_budget_ms {
            self.performance_budget_ms = v;
        }
        if let Some(v) = overrides.enable_contextual_filter {
            self.enable_contextual_filter = v;
        }
        if let Some(v) = overrides.enable_dynamic_thresholds {
            self.enable_dynamic_thresholds = v;
        }
        if let Some(v) = overrides.enable_quality_tracking {
            self.enable_quality_tracking = v;
        }
        self
    }

    pub fn with_filtering(mut self, filtering: FilteringConfig) -> Self {
        self.filtering = filtering;
        self
    }

    /// Replace the keyword table with rules parsed from JSON.
    pub fn with_rules_json(mut self, json: &str) -> RefineResult<Self> {
        self.filtering = FilteringConfig::from_rules_json(json)?;
        Ok(self)
    }

    pub fn with_overlap_threshold(mut self, threshold: f64) -> Self {
        self.overlap_threshold = threshold;
        self
    }

    pub fn with_spatial_thresholds(mut self, containment: f64, same_object: f64) -> Self {
        self.spatial_containment_threshold = containment;
        self.spatial_same_object_threshold = same_object;
        self
    }

    pub fn with_contextual_containment_threshold(mut self, threshold: f64) -> Self {
        self.contextual_containment_threshold = threshold;
        self
    }

    pub fn with_performance_budget_ms(mut self, budget_ms: u64) -> Self {
        self.performance_budget_ms = budget_ms;
        self
    }

    pub fn with_contextual_filter(mut self, enabled: bool) -> Self {
        self.enable_contextual_filter = enabled;
        self
    }

    pub fn with_dynamic_thresholds(mut self, enabled: bool) -> Self {
        self.enable_dynamic_thresholds = enabled;
        self
    }

    pub fn with_quality_tracking(mut self, enabled: bool) -> Self {
        self.enable_quality_tracking = enabled;
        self
    }

    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults. A rule table can be
    /// supplied inline via `STASH_REFINE_RULES_JSON`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load `.env` (if present) and then read the environment.
    pub fn from_dotenv() -> Self {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let filtering = match lookup("STASH_REFINE_RULES_JSON") {
            Some(json) => match Self::default().with_rules_json(&json) {
                Ok(config) => config.filtering,
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid STASH_REFINE_RULES_JSON");
                    defaults.filtering.clone()
                }
            },
            None => defaults.filtering.clone(),
        };

        Self {
            filtering,
            spatial_containment_threshold: parse_var(&lookup, "STASH_REFINE_SPATIAL_CONTAINMENT")
                .unwrap_or(defaults.spatial_containment_threshold),
            spatial_same_object_threshold: parse_var(&lookup, "STASH_REFINE_SPATIAL_SAME_OBJECT")
                .unwrap_or(defaults.spatial_same_object_threshold),
            contextual_containment_threshold: parse_var(&lookup, "STASH_REFINE_CONTEXTUAL_CONTAINMENT")
                .unwrap_or(defaults.contextual_containment_threshold),
            overlap_threshold: parse_var(&lookup, "STASH_REFINE_OVERLAP_THRESHOLD")
                .unwrap_or(defaults.overlap_threshold),
            performance_budget_ms: parse_var(&lookup, "STASH_REFINE_BUDGET_MS")
                .unwrap_or(defaults.performance_budget_ms),
            enable_contextual_filter: parse_var(&lookup, "STASH_REFINE_CONTEXTUAL")
                .unwrap_or(defaults.enable_contextual_filter),
            enable_dynamic_thresholds: parse_var(&lookup, "STASH_REFINE_DYNAMIC_THRESHOLDS")
                .unwrap_or(defaults.enable_dynamic_thresholds),
            enable_quality_tracking: parse_var(&lookup, "STASH_REFINE_QUALITY_TRACKING")
                .unwrap_or(defaults.enable_quality_tracking),
        }
    }

    /// Human-readable problems with this config. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let unit = [
            ("spatial_containment_threshold", self.spatial_containment_threshold),
            ("spatial_same_object_threshold", self.spatial_same_object_threshold),
            ("contextual_containment_threshold", self.contextual_containment_threshold),
            ("overlap_threshold", self.overlap_threshold),
            ("confidence_thresholds.objects_of_interest", self.filtering.confidence_thresholds.objects_of_interest),
            ("confidence_thresholds.objects_to_ignore", self.filtering.confidence_thresholds.objects_to_ignore),
            ("confidence_thresholds.default", self.filtering.confidence_thresholds.default),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{name} must be within [0, 1], got {value}"));
            }
        }

        if self.spatial_same_object_threshold <= self.spatial_containment_threshold {
            errors.push(format!(
                "spatial_same_object_threshold ({}) must exceed spatial_containment_threshold ({})",
                self.spatial_same_object_threshold, self.spatial_containment_threshold
            ));
        }

        if self.performance_budget_ms == 0 {
            errors.push("performance_budget_ms must be positive".to_string());
        }

        let blank = |list: &[String]| list.iter().any(|k| k.trim().is_empty());
        if blank(&self.filtering.objects_of_interest) {
            errors.push("objects_of_interest contains an empty keyword".to_string());
        }
        if blank(&self.filtering.objects_to_ignore) {
            errors.push("objects_to_ignore contains an empty keyword".to_string());
        }

        errors
    }

    /// Return the config when valid, otherwise every problem at once.
    pub fn validated(self) -> RefineResult<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(RefineError::InvalidConfig(errors))
        }
    }
}
