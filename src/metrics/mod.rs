//! Prometheus metrics for the delivery engine.
//!
//! This module provides metrics for monitoring deliveries:
//! - Intake metrics (submitted, deduplicated, cancelled)
//! - Outcome metrics (delivered, already delivered, retried, dead-lettered)
//! - Latency metrics (render and send duration)
//! - Queue depth and worker gauges

mod helpers;

pub use helpers::{encode_metrics, DispatchMetrics, QueueMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_delivery";

lazy_static! {
    // ============================================================================
    // Intake Metrics
    // ============================================================================

    /// Requests accepted into the queue by channel
    pub static ref SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_submitted_total", METRIC_PREFIX),
        "Total delivery requests accepted",
        &["channel"]
    ).unwrap();

    /// Enqueues answered with an existing job for the same dedup key
    pub static ref DEDUPLICATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deduplicated_total", METRIC_PREFIX),
        "Total enqueues collapsed onto a pending or in-flight job"
    ).unwrap();

    /// Pending jobs withdrawn by callers
    pub static ref CANCELLED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_cancelled_total", METRIC_PREFIX),
        "Total jobs cancelled before processing"
    ).unwrap();

    // ============================================================================
    // Outcome Metrics
    // ============================================================================

    /// Documents accepted by a sender
    pub static ref DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivered_total", METRIC_PREFIX),
        "Total documents delivered",
        &["channel"]
    ).unwrap();

    /// Jobs completed without sending because the key was already delivered
    pub static ref ALREADY_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_already_delivered_total", METRIC_PREFIX),
        "Total jobs short-circuited by the dedup ledger"
    ).unwrap();

    /// Failures scheduled for another attempt
    pub static ref RETRIED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_retried_total", METRIC_PREFIX),
        "Total failed attempts rescheduled",
        &["kind"]
    ).unwrap();

    /// Jobs moved to the dead-letter set
    pub static ref DEAD_LETTERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dead_lettered_total", METRIC_PREFIX),
        "Total jobs dead-lettered",
        &["kind"]
    ).unwrap();

    /// Leases that ran out before the worker finished
    pub static ref LEASE_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_lease_expired_total", METRIC_PREFIX),
        "Total leases reclaimed after expiry"
    ).unwrap();

    /// Send failures by channel and classification
    pub static ref SEND_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_send_errors_total", METRIC_PREFIX),
        "Total send failures",
        &["channel", "kind"]
    ).unwrap();

    /// Per-job tasks that panicked
    pub static ref WORKER_PANICS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_worker_panics_total", METRIC_PREFIX),
        "Total job tasks that panicked"
    ).unwrap();

    // ============================================================================
    // Latency Metrics
    // ============================================================================

    /// Template rendering duration
    pub static ref RENDER_LATENCY: Histogram = register_histogram!(
        format!("{}_render_duration_seconds", METRIC_PREFIX),
        "Time spent rendering documents",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    /// Sender call duration by channel
    pub static ref SEND_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_send_duration_seconds", METRIC_PREFIX),
        "Time spent handing documents to senders",
        &["channel"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Queue Gauges
    // ============================================================================

    /// Jobs waiting to be leased
    pub static ref JOBS_PENDING: IntGauge = register_int_gauge!(
        format!("{}_jobs_pending", METRIC_PREFIX),
        "Number of pending jobs"
    ).unwrap();

    /// Jobs currently leased by workers
    pub static ref JOBS_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_jobs_in_flight", METRIC_PREFIX),
        "Number of leased jobs"
    ).unwrap();

    /// Jobs waiting for operator action
    pub static ref DEAD_LETTERS: IntGauge = register_int_gauge!(
        format!("{}_dead_letters", METRIC_PREFIX),
        "Number of dead-lettered jobs"
    ).unwrap();

    /// Running dispatch workers
    pub static ref WORKERS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_workers_active", METRIC_PREFIX),
        "Number of running dispatch workers"
    ).unwrap();
}
