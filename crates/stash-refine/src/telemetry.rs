//! Metrics emitted by the refinement pipeline.
//!
//! Uses the `metrics` facade only. Hosts install an exporter; without one
//! every call is a no-op.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    // Run metrics
    pub const RUNS_TOTAL: &str = "stash_refine_runs_total";
    pub const FAILURES_TOTAL: &str = "stash_refine_failures_total";
    pub const BUDGET_OVERRUNS_TOTAL: &str = "stash_refine_budget_overruns_total";
    pub const RUN_DURATION_SECONDS: &str = "stash_refine_run_duration_seconds";

    // Stage metrics
    pub const STAGE_DURATION_SECONDS: &str = "stash_refine_stage_duration_seconds";

    // Item flow
    pub const ITEMS_IN_TOTAL: &str = "stash_refine_items_in_total";
    pub const ITEMS_OUT_TOTAL: &str = "stash_refine_items_out_total";
    pub const FALLBACKS_TOTAL: &str = "stash_refine_fallbacks_total";

    // Session state
    pub const THRESHOLD_UPDATES_TOTAL: &str = "stash_threshold_updates_total";
    pub const QUALITY_PRECISION: &str = "stash_quality_precision";
    pub const QUALITY_RECALL: &str = "stash_quality_recall";
}

/// Record a finished run.
pub fn record_run(success: bool, items_in: usize, items_out: usize, duration_secs: f64) {
    let labels = [("success", success.to_string())];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
    histogram!(names::RUN_DURATION_SECONDS).record(duration_secs);
    counter!(names::ITEMS_IN_TOTAL).increment(items_in as u64);
    counter!(names::ITEMS_OUT_TOTAL).increment(items_out as u64);
}

/// Record a failed run by error kind.
pub fn record_failure(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::FAILURES_TOTAL, &labels).increment(1);
}

/// Record one stage's duration.
pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a run that exceeded its performance budget.
pub fn record_budget_overrun() {
    counter!(names::BUDGET_OVERRUNS_TOTAL).increment(1);
}

/// Record a contextual fallback activation.
pub fn record_fallback() {
    counter!(names::FALLBACKS_TOTAL).increment(1);
}

/// Record a threshold update by origin (feedback, metrics, manual).
pub fn record_threshold_update(origin: &str) {
    let labels = [("origin", origin.to_string())];
    counter!(names::THRESHOLD_UPDATES_TOTAL, &labels).increment(1);
}

/// Update the latest quality gauges.
pub fn set_quality(precision: f64, recall: f64) {
    gauge!(names::QUALITY_PRECISION).set(precision);
    gauge!(names::QUALITY_RECALL).set(recall);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_run(true, 3, 2, 0.01);
        record_failure("internal");
        record_stage_duration("filter", 0.001);
        record_budget_overrun();
        record_fallback();
        record_threshold_update("manual");
        set_quality(0.8, 0.7);
    }

    #[test]
    fn test_names_are_prefixed() {
        for name in [
            names::RUNS_TOTAL,
            names::STAGE_DURATION_SECONDS,
            names::ITEMS_IN_TOTAL,
            names::ITEMS_OUT_TOTAL,
            names::BUDGET_OVERRUNS_TOTAL,
            names::FAILURES_TOTAL,
        ] {
            assert!(name.starts_with("stash_refine_"));
        }
        assert!(names::THRESHOLD_UPDATES_TOTAL.starts_with("stash_"));
    }
}
