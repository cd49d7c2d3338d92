//! Dispatch workers and the delivery engine.
//!
//! Workers lease batches from the queue, reserve each job's dedup key in the
//! ledger, render the template, hand the document to the channel sender and
//! report the outcome back to the ledger and the queue.

mod engine;
mod events;
mod pool;
mod processor;
mod worker;

use std::time::Duration;

use thiserror::Error;

use crate::config::DeliverySettings;

pub use engine::{DeliveryEngine, EngineStats};
pub use events::DeliveryEvents;
pub use pool::WorkerPool;
pub use processor::{JobOutcome, JobProcessor};
pub use worker::DeliveryWorker;

/// Capacity of the terminal-event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Errors from engine lifecycle operations
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("delivery engine is already running")]
    AlreadyRunning,

    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout { timeout: Duration },
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub worker_count: usize,
    /// Jobs leased per poll
    pub batch_size: usize,
    /// Idle sleep between empty polls
    pub poll_interval: Duration,
    /// A send still running after this is abandoned as transient
    pub send_timeout: Duration,
    /// Ledger reservation lifetime; matches the queue lease timeout
    pub reservation_ttl: Duration,
    /// Delay before a job whose key is in flight elsewhere is offered again
    pub in_flight_delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            batch_size: 10,
            poll_interval: Duration::from_millis(500),
            send_timeout: Duration::from_secs(30),
            reservation_ttl: Duration::from_secs(60),
            in_flight_delay: Duration::from_secs(1),
        }
    }
}

impl From<&DeliverySettings> for DispatchConfig {
    fn from(settings: &DeliverySettings) -> Self {
        Self {
            worker_count: settings.worker_count,
            batch_size: settings.batch_size,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            send_timeout: Duration::from_secs(settings.send_timeout_seconds),
            reservation_ttl: Duration::from_secs(settings.lease_timeout_seconds),
            in_flight_delay: Duration::from_millis(settings.base_backoff_ms),
        }
    }
}
