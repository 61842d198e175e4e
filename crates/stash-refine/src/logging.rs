//! Structured run logging and subscriber setup.
//!
//! Provides consistent, structured logging for refinement runs with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Run logger for structured logging with consistent formatting.
///
/// Every lifecycle event carries the run id and the image id so one image's
/// pass through the pipeline can be followed in aggregated logs.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    image_id: String,
}

impl RunLogger {
    /// Create a logger with a fresh run id.
    pub fn new(image_id: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            image_id: image_id.to_string(),
        }
    }

    /// Create a logger with a caller-supplied run id.
    pub fn with_run_id(run_id: &str, image_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            image_id: image_id.to_string(),
        }
    }

    pub fn log_start(&self, items: usize) {
        info!(
            run_id = %self.run_id,
            image_id = %self.image_id,
            items,
            "Refinement started"
        );
    }

    pub fn log_stage(&self, stage: &str, items_in: usize, items_out: usize, elapsed_ms: f64) {
        info!(
            run_id = %self.run_id,
            image_id = %self.image_id,
            stage,
            items_in,
            items_out,
            elapsed_ms,
            "Stage complete"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            image_id = %self.image_id,
            "Refinement warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            image_id = %self.image_id,
            "Refinement failed: {}", message
        );
    }

    pub fn log_completion(&self, items_in: usize, items_out: usize, total_ms: f64) {
        info!(
            run_id = %self.run_id,
            image_id = %self.image_id,
            items_in,
            items_out,
            total_ms,
            "Refinement completed"
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    /// Create a tracing span for this run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "refine_run",
            run_id = %self.run_id,
            image_id = %self.image_id
        )
    }
}

/// Install a global subscriber: JSON lines when `json` is set, ANSI text
/// otherwise. `RUST_LOG` overrides the default `info` level.
///
/// Intended for hosts and tests; the library never calls it. Returns an
/// error if a global subscriber is already set.
pub fn init_tracing(json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(env_filter)
            .try_init()
    }
}
