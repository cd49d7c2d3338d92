//! Graceful shutdown of the delivery engine.
//!
//! Sequence:
//! 1. Signal workers and background tasks to stop
//! 2. Wait for workers to report their in-flight jobs, up to the drain timeout
//! 3. Report what is left in the queue

use std::sync::Arc;
use std::time::Duration;

use crate::config::ShutdownSettings;
use crate::dispatch::DeliveryEngine;

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for workers to finish their current batch
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            drain_timeout: Duration::from_secs(settings.drain_timeout_seconds),
        }
    }
}

/// Handles graceful shutdown of the engine
pub struct GracefulShutdown {
    engine: Arc<DeliveryEngine>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(engine: Arc<DeliveryEngine>, config: ShutdownConfig) -> Self {
        Self { engine, config }
    }

    /// Execute the shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(
            reason = %reason,
            drain_timeout_secs = self.config.drain_timeout.as_secs(),
            "Starting graceful shutdown - Phase 1: Stopping workers"
        );
        result.workers_drained = match self.engine.shutdown(self.config.drain_timeout).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Workers did not drain in time");
                false
            }
        };

        tracing::info!("Phase 2: Reporting remaining work");
        let stats = self.engine.stats().await;
        result.pending_jobs = stats.queue.pending;
        result.in_flight_jobs = stats.queue.in_flight;
        result.dead_lettered_jobs = stats.queue.dead_lettered;

        if result.pending_jobs > 0 || result.in_flight_jobs > 0 {
            tracing::warn!(
                pending = result.pending_jobs,
                in_flight = result.in_flight_jobs,
                "Jobs left undelivered in the in-memory queue"
            );
        }

        result.duration = start.elapsed();
        result.success = result.workers_drained;

        tracing::info!(
            workers_drained = result.workers_drained,
            pending = result.pending_jobs,
            dead_lettered = result.dead_lettered_jobs,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    /// Whether every worker stopped within the drain timeout
    pub workers_drained: bool,
    pub pending_jobs: usize,
    pub in_flight_jobs: usize,
    pub dead_lettered_jobs: usize,
    pub duration: Duration,
}
