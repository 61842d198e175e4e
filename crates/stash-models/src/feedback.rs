//! User feedback on catalogued detections.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user did with a suggested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    /// Kept the item as suggested.
    Accepted,
    /// Deleted the item.
    Rejected,
    /// Kept the item after editing its name or category.
    Modified,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::Accepted => "accepted",
            UserAction::Rejected => "rejected",
            UserAction::Modified => "modified",
        }
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single feedback event reported by the app shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserFeedback {
    pub item_id: String,
    pub user_action: UserAction,
    /// Confidence the item had when it was shown
    pub confidence: f64,
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

impl UserFeedback {
    /// Create a feedback event stamped with the current time.
    pub fn new(
        item_id: impl Into<String>,
        user_action: UserAction,
        confidence: f64,
        category: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            user_action,
            confidence,
            category: category.into(),
            timestamp: Utc::now(),
        }
    }
}
