//! Performance-monitoring collaborator.
//!
//! The pipeline reports through [`PerformanceMonitor`] without waiting for
//! it: calls are spawned on the ambient tokio runtime and their failures are
//! logged, never propagated. Without a runtime the report is dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::RefineResult;

/// Performance telemetry, tagged by metric kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformanceMetric {
    /// Cache lookup by a collaborator (e.g. provider response cache)
    Cache {
        operation: String,
        hit: bool,
        duration_ms: f64,
    },
    /// Work fanned out across threads
    Parallel {
        operation: String,
        tasks: usize,
        duration_ms: f64,
    },
    /// Slowest stage of a run
    Bottleneck {
        stage: String,
        duration_ms: f64,
        share_of_total: f64,
    },
    /// A budget overrun that triggered an optimization request
    Optimization {
        reason: String,
        total_ms: f64,
        budget_ms: u64,
    },
}

impl PerformanceMetric {
    pub fn kind(&self) -> &'static str {
        match self {
            PerformanceMetric::Cache { .. } => "cache",
            PerformanceMetric::Parallel { .. } => "parallel",
            PerformanceMetric::Bottleneck { .. } => "bottleneck",
            PerformanceMetric::Optimization { .. } => "optimization",
        }
    }
}

/// Request sent when a run exceeds its budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub run_id: String,
    pub total_ms: f64,
    pub budget_ms: u64,
    pub item_count: usize,
    pub slowest_stage: Option<String>,
}

/// Receiver of pipeline performance reports.
#[async_trait]
pub trait PerformanceMonitor: Send + Sync {
    /// Record one metric.
    async fn record(&self, metric: PerformanceMetric) -> RefineResult<()>;

    /// Ask the monitor to optimize after a budget overrun.
    async fn request_optimization(&self, request: OptimizationRequest) -> RefineResult<()>;
}

/// Monitor that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPerformanceMonitor;

#[async_trait]
impl PerformanceMonitor for NoopPerformanceMonitor {
    async fn record(&self, _metric: PerformanceMetric) -> RefineResult<()> {
        Ok(())
    }

    async fn request_optimization(&self, _request: OptimizationRequest) -> RefineResult<()> {
        Ok(())
    }
}

/// Reports kept per buffer by [`InMemoryPerformanceMonitor::new`].
pub const DEFAULT_MONITOR_CAPACITY: usize = 1024;

fn push_bounded<T>(buffer: &mut VecDeque<T>, capacity: usize, value: T) {
    if buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

/// Monitor that keeps the most recent reports in memory, for tests and
/// short sessions. Each buffer holds at most `capacity` entries; the oldest
/// is evicted first. Cloning shares the buffers.
#[derive(Debug, Clone)]
pub struct InMemoryPerformanceMonitor {
    capacity: usize,
    metrics: Arc<Mutex<VecDeque<PerformanceMetric>>>,
    requests: Arc<Mutex<VecDeque<OptimizationRequest>>>,
}

impl Default for InMemoryPerformanceMonitor {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MONITOR_CAPACITY)
    }
}

impl InMemoryPerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor keeping at most `capacity` (minimum 1) entries per buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            metrics: Arc::default(),
            requests: Arc::default(),
        }
    }

    pub async fn metrics(&self) -> Vec<PerformanceMetric> {
        self.metrics.lock().await.iter().cloned().collect()
    }

    pub async fn requests(&self) -> Vec<OptimizationRequest> {
        self.requests.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl PerformanceMonitor for InMemoryPerformanceMonitor {
    async fn record(&self, metric: PerformanceMetric) -> RefineResult<()> {
        push_bounded(&mut *self.metrics.lock().await, self.capacity, metric);
        Ok(())
    }

    async fn request_optimization(&self, request: OptimizationRequest) -> RefineResult<()> {
        push_bounded(&mut *self.requests.lock().await, self.capacity, request);
        Ok(())
    }
}

/// Send reports to `monitor` without waiting.
///
/// Returns `false` when no tokio runtime is available and the reports
/// were dropped.
pub fn dispatch(
    monitor: Arc<dyn PerformanceMonitor>,
    metrics: Vec<PerformanceMetric>,
    request: Option<OptimizationRequest>,
) -> bool {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!(
            metrics = metrics.len(),
            has_request = request.is_some(),
            "No async runtime; performance report dropped"
        );
        return false;
    };

    handle.spawn(async move {
        for metric in metrics {
            let kind = metric.kind();
            if let Err(e) = monitor.record(metric).await {
                warn!(kind, error = %e, "Performance monitor failed to record metric");
            }
        }
        if let Some(request) = request {
            if let Err(e) = monitor.request_optimization(request).await {
                warn!(error = %e, "Performance monitor rejected optimization request");
            }
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefineError;

    struct FailingMonitor;

    #[async_trait]
    impl PerformanceMonitor for FailingMonitor {
        async fn record(&self, _metric: PerformanceMetric) -> RefineResult<()> {
            Err(RefineError::internal("monitor down"))
        }

        async fn request_optimization(&self, _request: OptimizationRequest) -> RefineResult<()> {
            Err(RefineError::internal("monitor down"))
        }
    }

    fn bottleneck() -> PerformanceMetric {
        PerformanceMetric::Bottleneck {
            stage: "spatial".into(),
            duration_ms: 12.0,
            share_of_total: 0.6,
        }
    }

    #[test]
    fn test_metric_tagging() {
        let json = serde_json::to_value(bottleneck()).unwrap();
        assert_eq!(json["kind"], "bottleneck");
        assert_eq!(json["stage"], "spatial");
        assert_eq!(bottleneck().kind(), "bottleneck");
    }

    #[test]
    fn test_dispatch_without_runtime() {
        let monitor = InMemoryPerformanceMonitor::new();
        assert!(!dispatch(Arc::new(monitor), vec![bottleneck()], None));
    }

    #[tokio::test]
    async fn test_dispatch_records() {
        let monitor = InMemoryPerformanceMonitor::new();
        let request = OptimizationRequest {
            run_id: "run".into(),
            total_ms: 4000.0,
            budget_ms: 3000,
            item_count: 40,
            slowest_stage: Some("spatial".into()),
        };
        assert!(dispatch(Arc::new(monitor.clone()), vec![bottleneck()], Some(request.clone())));

        for _ in 0..100 {
            if !monitor.requests().await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(monitor.metrics().await, vec![bottleneck()]);
        assert_eq!(monitor.requests().await, vec![request]);
    }

    #[tokio::test]
    async fn test_failing_monitor_is_contained() {
        assert!(dispatch(Arc::new(FailingMonitor), vec![bottleneck()], None));
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_in_memory_monitor_is_bounded() {
        let monitor = InMemoryPerformanceMonitor::with_capacity(2);
        for stage in ["filtering", "spatial", "overlap"] {
            monitor
                .record(PerformanceMetric::Bottleneck {
                    stage: stage.into(),
                    duration_ms: 1.0,
                    share_of_total: 0.5,
                })
                .await
                .unwrap();
        }
        let stages: Vec<String> = monitor
            .metrics()
            .await
            .into_iter()
            .filter_map(|m| match m {
                PerformanceMetric::Bottleneck { stage, .. } => Some(stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec!["spatial", "overlap"]);
    }

    #[tokio::test]
    async fn test_noop_monitor() {
        let monitor = NoopPerformanceMonitor;
        assert!(monitor.record(bottleneck()).await.is_ok());
    }
}
