//! Error types for refinement operations.

use thiserror::Error;

/// Result type for refinement operations.
pub type RefineResult<T> = Result<T, RefineError>;

/// Errors that can occur while refining detections.
///
/// None of these escape the orchestrator: `RefinementPipeline::refine`
/// converts them into a failed `RefinementResult`.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("Non-finite {field} on item {item_id}")]
    NonFiniteValue { item_id: String, field: &'static str },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("Shared state poisoned: {0}")]
    StatePoisoned(&'static str),

    #[error("Rule table parse error: {0}")]
    RuleTable(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RefineError {
    /// Create a non-finite value error.
    pub fn non_finite(item_id: impl Into<String>, field: &'static str) -> Self {
        Self::NonFiniteValue {
            item_id: item_id.into(),
            field,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NonFiniteValue { .. } => "non_finite_value",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidConfig(_) => "invalid_config",
            Self::StatePoisoned(_) => "state_poisoned",
            Self::RuleTable(_) => "rule_table",
            Self::Internal(_) => "internal",
        }
    }
}

/// Map a poisoned lock into a `RefineError` naming the guarded state.
pub(crate) fn poisoned<T>(what: &'static str) -> impl FnOnce(std::sync::PoisonError<T>) -> RefineError {
    move |_| RefineError::StatePoisoned(what)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RefineError::non_finite("item-1", "confidence").to_string(),
            "Non-finite confidence on item item-1"
        );
        assert_eq!(
            RefineError::InvalidConfig(vec!["a".into(), "b".into()]).to_string(),
            "Invalid configuration: a; b"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(RefineError::internal("x").kind(), "internal");
        assert_eq!(RefineError::StatePoisoned("thresholds").kind(), "state_poisoned");
    }
}
