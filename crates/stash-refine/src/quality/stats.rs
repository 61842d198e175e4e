//! Statistical helpers for quality tracking.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `tp / (tp + fp)`, zero when nothing was predicted.
pub fn calculate_precision(true_positives: usize, false_positives: usize) -> f64 {
    let predicted = true_positives + false_positives;
    if predicted == 0 {
        0.0
    } else {
        true_positives as f64 / predicted as f64
    }
}

/// `tp / (tp + fn)`, zero when there was nothing to find.
pub fn calculate_recall(true_positives: usize, false_negatives: usize) -> f64 {
    let actual = true_positives + false_negatives;
    if actual == 0 {
        0.0
    } else {
        true_positives as f64 / actual as f64
    }
}

/// Harmonic mean of precision and recall, zero when both are zero.
pub fn calculate_f1(precision: f64, recall: f64) -> f64 {
    let sum = precision + recall;
    if sum <= 0.0 {
        0.0
    } else {
        2.0 * precision * recall / sum
    }
}

/// Distribution of confidence values in one batch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl ConfidenceStats {
    /// Compute statistics over `values`. Empty input gives all zeros.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Self {
            count: values.len(),
            mean,
            median,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            std_dev: variance.sqrt(),
        }
    }
}

/// Indices of values more than two standard deviations from the mean.
/// Fewer than three values never have outliers.
pub fn find_outliers(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    let stats = ConfidenceStats::from_values(values);
    let limit = 2.0 * stats.std_dev;
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| (*v - stats.mean).abs() > limit)
        .map(|(idx, _)| idx)
        .collect()
}

/// Minimum absolute slope that counts as a trend.
pub const TREND_SLOPE_THRESHOLD: f64 = 0.01;

/// Direction of a metric over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    #[default]
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Declining => "declining",
            TrendDirection::Stable => "stable",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Least-squares trend of a series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub direction: TrendDirection,
    pub slope: f64,
    /// `min(|slope| * 10, 1)`
    pub strength: f64,
}

/// Ordinary least squares slope of `values` against their index.
pub fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Trend of a series where higher values are better.
pub fn analyze_trend(values: &[f64]) -> Trend {
    let slope = ols_slope(values);
    let direction = if slope >= TREND_SLOPE_THRESHOLD {
        TrendDirection::Improving
    } else if slope <= -TREND_SLOPE_THRESHOLD {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };
    Trend {
        direction,
        slope,
        strength: (slope.abs() * 10.0).min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_edges() {
        assert_eq!(calculate_precision(0, 5), 0.0);
        assert_eq!(calculate_precision(5, 0), 1.0);
        assert_eq!(calculate_precision(0, 0), 0.0);
        assert_eq!(calculate_precision(3, 1), 0.75);
    }

    #[test]
    fn test_recall_edges() {
        assert_eq!(calculate_recall(0, 5), 0.0);
        assert_eq!(calculate_recall(5, 0), 1.0);
        assert_eq!(calculate_recall(0, 0), 0.0);
    }

    #[test]
    fn test_f1() {
        assert_eq!(calculate_f1(0.0, 0.0), 0.0);
        assert!((calculate_f1(1.0, 0.5) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_stats() {
        let stats = ConfidenceStats::from_values(&[0.2, 0.4, 0.6, 0.8]);
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        assert!((stats.median - 0.5).abs() < 1e-12);
        assert_eq!(stats.min, 0.2);
        assert_eq!(stats.max, 0.8);
        assert!((stats.std_dev - 0.05f64.sqrt()).abs() < 1e-12);

        assert_eq!(ConfidenceStats::from_values(&[]), ConfidenceStats::default());
    }

    #[test]
    fn test_outliers() {
        let mut values = vec![0.8; 10];
        values.push(0.1);
        assert_eq!(find_outliers(&values), vec![10]);
        assert!(find_outliers(&[0.1, 0.9]).is_empty());
    }

    #[test]
    fn test_trend() {
        let up = analyze_trend(&[0.5, 0.6, 0.7, 0.8]);
        assert_eq!(up.direction, TrendDirection::Improving);
        assert!((up.slope - 0.1).abs() < 1e-9);
        assert!((up.strength - 1.0).abs() < 1e-9);

        let down = analyze_trend(&[0.9, 0.85, 0.8]);
        assert_eq!(down.direction, TrendDirection::Declining);
        assert!((down.strength - 0.5).abs() < 1e-9);

        assert_eq!(analyze_trend(&[0.7, 0.702, 0.701]).direction, TrendDirection::Stable);
        assert_eq!(analyze_trend(&[0.7]).direction, TrendDirection::Stable);
    }
}
