//! Durable-in-process delivery queue.
//!
//! This module provides the job store between intake and the dispatch
//! workers: idempotent enqueue by dedup key, exclusive leases with a
//! visibility timeout, retry scheduling with exponential backoff, and a
//! dead-letter set for jobs that cannot be delivered.

mod backend;
mod memory_backend;

use std::sync::Arc;
use std::time::Duration;

use crate::config::DeliverySettings;
use crate::delivery::RetryPolicy;

pub use backend::{
    validate_request, DeliveryQueue, QueueError, QueueStats, MAX_DEDUP_KEY_LEN,
    MAX_RECIPIENT_LEN, MAX_TEMPLATE_ID_LEN,
};
pub use memory_backend::MemoryDeliveryQueue;

/// Configuration for the delivery queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Backoff and attempt budget for transient failures
    pub retry: RetryPolicy,
    /// How long a lease stays valid without being completed
    pub lease_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            lease_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&DeliverySettings> for QueueConfig {
    fn from(settings: &DeliverySettings) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: settings.max_attempts,
                base_delay: Duration::from_millis(settings.base_backoff_ms),
                max_delay: Duration::from_millis(settings.max_backoff_ms),
                jitter_factor: settings.jitter_factor,
                ..RetryPolicy::default()
            },
            lease_timeout: Duration::from_secs(settings.lease_timeout_seconds),
        }
    }
}

/// Create the queue backend.
///
/// Only the in-memory backend exists; durable storage is provided by
/// implementing `DeliveryQueue` over an external store.
pub fn create_delivery_queue(config: QueueConfig) -> Arc<dyn DeliveryQueue> {
    tracing::info!(
        backend = "memory",
        max_attempts = config.retry.max_attempts,
        lease_timeout_secs = config.lease_timeout.as_secs(),
        "Creating memory delivery queue"
    );
    Arc::new(MemoryDeliveryQueue::new(config))
}
