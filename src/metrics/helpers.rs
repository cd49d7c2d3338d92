//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    ALREADY_DELIVERED_TOTAL, CANCELLED_TOTAL, DEAD_LETTERED_TOTAL, DEAD_LETTERS,
    DEDUPLICATED_TOTAL, DELIVERED_TOTAL, JOBS_IN_FLIGHT, JOBS_PENDING, LEASE_EXPIRED_TOTAL,
    RENDER_LATENCY, RETRIED_TOTAL, SEND_ERRORS_TOTAL, SEND_LATENCY, SUBMITTED_TOTAL,
    WORKERS_ACTIVE, WORKER_PANICS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for queue state transitions
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record a newly accepted job
    pub fn record_submitted(channel: &str) {
        SUBMITTED_TOTAL.with_label_values(&[channel]).inc();
    }

    /// Record an enqueue that returned an existing job
    pub fn record_deduplicated() {
        DEDUPLICATED_TOTAL.inc();
    }

    /// Record a failed attempt that will be retried
    pub fn record_retry(kind: &str) {
        RETRIED_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a job moved to the dead-letter set
    pub fn record_dead_lettered(kind: &str) {
        DEAD_LETTERED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_cancelled() {
        CANCELLED_TOTAL.inc();
    }

    /// Record leases reclaimed after expiry
    pub fn record_leases_expired(count: u64) {
        LEASE_EXPIRED_TOTAL.inc_by(count);
    }

    /// Refresh queue depth gauges
    pub fn set_depth(pending: usize, in_flight: usize, dead_lettered: usize) {
        JOBS_PENDING.set(pending as i64);
        JOBS_IN_FLIGHT.set(in_flight as i64);
        DEAD_LETTERS.set(dead_lettered as i64);
    }
}

/// Helper struct for worker-side metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_delivered(channel: &str) {
        DELIVERED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_already_delivered() {
        ALREADY_DELIVERED_TOTAL.inc();
    }

    pub fn record_render(elapsed: Duration) {
        RENDER_LATENCY.observe(elapsed.as_secs_f64());
    }

    pub fn record_send(channel: &str, elapsed: Duration) {
        SEND_LATENCY
            .with_label_values(&[channel])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_send_error(channel: &str, kind: &str) {
        SEND_ERRORS_TOTAL.with_label_values(&[channel, kind]).inc();
    }

    pub fn record_panic() {
        WORKER_PANICS_TOTAL.inc();
    }

    pub fn set_workers(count: usize) {
        WORKERS_ACTIVE.set(count as i64);
    }
}
