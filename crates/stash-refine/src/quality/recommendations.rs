//! Fixed rule table turning a quality summary into recommendations and alerts.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::stats::TrendDirection;
use super::{QualitySummary, QualityTrackerConfig};

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A quality condition that needs attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAlert {
    pub metric: String,
    pub severity: AlertSeverity,
    pub message: String,
}

struct Rule {
    metric: &'static str,
    applies: fn(&QualitySummary, &QualityTrackerConfig) -> bool,
    recommendation: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        metric: "precision",
        applies: |s, c| s.average_precision < c.precision_target,
        recommendation: "Raise confidence thresholds: too many weak or ignored detections are kept",
    },
    Rule {
        metric: "recall",
        applies: |s, c| s.average_recall < c.recall_target,
        recommendation: "Lower thresholds for objects of interest: confident detections are being dropped",
    },
    Rule {
        metric: "confidence_variance",
        applies: |s, c| s.average_confidence_std_dev > c.variance_alert,
        recommendation: "Confidence spread is high; check provider consistency and capture quality",
    },
    Rule {
        metric: "processing_time",
        applies: |s, c| s.average_processing_time_ms > c.processing_budget_ms as f64,
        recommendation: "Processing exceeds budget; cap input size or disable the contextual stage",
    },
    Rule {
        metric: "precision_trend",
        applies: |s, _| s.precision_trend.direction == TrendDirection::Declining,
        recommendation: "Precision is declining across recent images; review recent threshold feedback",
    },
    Rule {
        metric: "recall_trend",
        applies: |s, _| s.recall_trend.direction == TrendDirection::Declining,
        recommendation: "Recall is declining across recent images; thresholds may be drifting upward",
    },
];

/// Recommendations whose rule matches `summary`, in table order.
pub fn recommendations(summary: &QualitySummary, config: &QualityTrackerConfig) -> Vec<String> {
    if summary.samples == 0 {
        return Vec::new();
    }
    RULES
        .iter()
        .filter(|rule| (rule.applies)(summary, config))
        .map(|rule| rule.recommendation.to_string())
        .collect()
}

/// Severity for a metric that should stay at or above `target`.
fn floor_severity(value: f64, target: f64) -> Option<AlertSeverity> {
    if value < target * 0.7 {
        Some(AlertSeverity::Critical)
    } else if value < target {
        Some(AlertSeverity::Warning)
    } else {
        None
    }
}

/// Alerts for `summary`, most severe first.
pub fn alerts(summary: &QualitySummary, config: &QualityTrackerConfig) -> Vec<QualityAlert> {
    if summary.samples == 0 {
        return Vec::new();
    }
    let mut alerts = Vec::new();

    if let Some(severity) = floor_severity(summary.average_precision, config.precision_target) {
        alerts.push(QualityAlert {
            metric: "precision".into(),
            severity,
            message: format!(
                "Average precision {:.2} below target {:.2}",
                summary.average_precision, config.precision_target
            ),
        });
    }
    if let Some(severity) = floor_severity(summary.average_recall, config.recall_target) {
        alerts.push(QualityAlert {
            metric: "recall".into(),
            severity,
            message: format!(
                "Average recall {:.2} below target {:.2}",
                summary.average_recall, config.recall_target
            ),
        });
    }
    if summary.average_confidence_std_dev > config.variance_alert {
        alerts.push(QualityAlert {
            metric: "confidence_variance".into(),
            severity: AlertSeverity::Warning,
            message: format!(
                "Confidence std dev {:.2} above {:.2}",
                summary.average_confidence_std_dev, config.variance_alert
            ),
        });
    }

    let budget = config.processing_budget_ms as f64;
    if summary.average_processing_time_ms > budget {
        let severity = if summary.average_processing_time_ms > budget * 2.0 {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(QualityAlert {
            metric: "processing_time".into(),
            severity,
            message: format!(
                "Average processing time {:.0}ms over {}ms budget",
                summary.average_processing_time_ms, config.processing_budget_ms
            ),
        });
    }

    for (metric, trend) in [
        ("precision_trend", &summary.precision_trend),
        ("recall_trend", &summary.recall_trend),
        ("f1_trend", &summary.f1_trend),
    ] {
        if trend.direction == TrendDirection::Declining {
            alerts.push(QualityAlert {
                metric: metric.into(),
                severity: AlertSeverity::Info,
                message: format!("Declining with slope {:.3}", trend.slope),
            });
        }
    }

    alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::stats::Trend;

    fn summary() -> QualitySummary {
        QualitySummary {
            samples: 5,
            average_precision: 0.9,
            average_recall: 0.9,
            average_f1: 0.9,
            average_confidence_std_dev: 0.1,
            average_processing_time_ms: 100.0,
            ..QualitySummary::default()
        }
    }

    #[test]
    fn test_healthy_summary_is_quiet() {
        let config = QualityTrackerConfig::default();
        assert!(recommendations(&summary(), &config).is_empty());
        assert!(alerts(&summary(), &config).is_empty());
    }

    #[test]
    fn test_low_precision() {
        let config = QualityTrackerConfig::default();
        let s = QualitySummary {
            average_precision: 0.3,
            ..summary()
        };
        let recs = recommendations(&s, &config);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("Raise"));

        let alerts = alerts(&s, &config);
        assert_eq!(alerts[0].metric, "precision");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_alerts_sorted_by_severity() {
        let config = QualityTrackerConfig::default();
        let s = QualitySummary {
            average_recall: 0.65,
            average_processing_time_ms: 10_000.0,
            precision_trend: Trend {
                direction: TrendDirection::Declining,
                slope: -0.05,
                strength: 0.5,
            },
            ..summary()
        };
        let severities: Vec<AlertSeverity> = alerts(&s, &config).iter().map(|a| a.severity).collect();
        assert_eq!(
            severities,
            vec![AlertSeverity::Critical, AlertSeverity::Warning, AlertSeverity::Info]
        );
    }

    #[test]
    fn test_no_samples_no_output() {
        let config = QualityTrackerConfig::default();
        let empty = QualitySummary::default();
        assert!(recommendations(&empty, &config).is_empty());
        assert!(alerts(&empty, &config).is_empty());
    }
}
