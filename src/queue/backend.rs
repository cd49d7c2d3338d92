//! Backend trait for the delivery queue.
//!
//! The queue owns every job from enqueue until a terminal outcome. Workers
//! lease jobs, and each lease carries a fresh `lease_id` that must be
//! presented to complete, retry or release the job. A worker whose lease
//! expired and was handed to someone else therefore cannot touch the job.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::delivery::{
    AckDisposition, DeadLetterFilter, DeliveryJob, DeliveryRequest, DeliveryResult, ErrorInfo,
};

/// Longest accepted recipient (RFC 5321 path limit)
pub const MAX_RECIPIENT_LEN: usize = 320;
/// Longest accepted template ID
pub const MAX_TEMPLATE_ID_LEN: usize = 64;
/// Longest accepted dedup key
pub const MAX_DEDUP_KEY_LEN: usize = 256;

/// Errors that can occur during queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Request rejected at enqueue; never retried
    #[error("Invalid delivery request: {0}")]
    Validation(String),

    /// Job is absent, terminal, or not leased under the presented lease
    #[error("Unknown job: {0}")]
    UnknownJob(Uuid),

    /// Job is leased by a worker and cannot be withdrawn
    #[error("Job {0} is being processed")]
    JobInFlight(Uuid),

    /// Another worker claimed the job first; handled inside `lease`
    #[error("Job {0} was leased concurrently")]
    LeaseConflict(Uuid),

    /// Backend is temporarily unavailable
    #[error("Queue backend unavailable: {0}")]
    Unavailable(String),
}

/// Statistics about the queue backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    /// Backend type identifier
    pub backend_type: String,
    /// Jobs waiting to be leased
    pub pending: usize,
    /// Jobs currently leased
    pub in_flight: usize,
    /// Jobs waiting for operator action
    pub dead_lettered: usize,
    /// Terminal results still retained for status queries
    pub finished: usize,
}

/// Backend trait for delivery job storage.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`); every worker and the
/// HTTP layer share one instance.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Store a request as a pending job and return its ID.
    ///
    /// If a pending or leased job with the same dedup key exists, its ID is
    /// returned and nothing is stored.
    async fn enqueue(&self, request: DeliveryRequest) -> Result<Uuid, QueueError>;

    /// Lease up to `max` due jobs, highest priority first, then oldest first.
    async fn lease(&self, worker_id: usize, max: usize) -> Result<Vec<DeliveryJob>, QueueError>;

    /// Complete a leased job and record its terminal result.
    async fn ack(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        disposition: AckDisposition,
    ) -> Result<DeliveryResult, QueueError>;

    /// Record a failed attempt; the result is either `Pending` (scheduled
    /// again) or `DeadLettered`.
    async fn retry(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        error: ErrorInfo,
    ) -> Result<DeliveryResult, QueueError>;

    /// Return a leased job to pending after `delay` without counting an attempt.
    async fn release(&self, job_id: Uuid, lease_id: Uuid, delay: Duration)
        -> Result<(), QueueError>;

    /// Withdraw a pending job, or one whose lease has expired.
    async fn cancel(&self, job_id: Uuid) -> Result<DeliveryResult, QueueError>;

    /// Return jobs with expired leases to pending; returns how many.
    async fn reclaim_expired_leases(&self) -> Result<usize, QueueError>;

    /// Current or terminal status of a job.
    async fn status(&self, job_id: Uuid) -> Result<Option<DeliveryResult>, QueueError>;

    /// Dead-lettered jobs matching `filter`, oldest first.
    async fn list_dead_lettered(
        &self,
        filter: &DeadLetterFilter,
    ) -> Result<Vec<DeliveryJob>, QueueError>;

    /// Remove a job from the dead-letter set and hand it to the caller.
    async fn take_dead_lettered(&self, job_id: Uuid) -> Result<DeliveryJob, QueueError>;

    /// Drop terminal results last updated before `older_than`; returns how many.
    async fn purge_finished(&self, older_than: DateTime<Utc>) -> Result<usize, QueueError>;

    /// Get queue statistics.
    async fn stats(&self) -> QueueStats;
}

/// Check a request before it is accepted into the queue
pub fn validate_request(request: &DeliveryRequest) -> Result<(), QueueError> {
    let recipient = request.recipient.trim();
    if recipient.is_empty() {
        return Err(QueueError::Validation("recipient is required".to_string()));
    }
    if recipient.len() > MAX_RECIPIENT_LEN {
        return Err(QueueError::Validation(format!(
            "recipient exceeds {} characters",
            MAX_RECIPIENT_LEN
        )));
    }

    let template_id = &request.template_id;
    if template_id.is_empty() {
        return Err(QueueError::Validation("template_id is required".to_string()));
    }
    if template_id.len() > MAX_TEMPLATE_ID_LEN {
        return Err(QueueError::Validation(format!(
            "template_id exceeds {} characters",
            MAX_TEMPLATE_ID_LEN
        )));
    }
    if !template_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(QueueError::Validation(
            "template_id may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }

    if request.dedup_key.trim().is_empty() {
        return Err(QueueError::Validation("dedup_key must not be empty".to_string()));
    }
    if request.dedup_key.len() > MAX_DEDUP_KEY_LEN {
        return Err(QueueError::Validation(format!(
            "dedup_key exceeds {} characters",
            MAX_DEDUP_KEY_LEN
        )));
    }

    Ok(())
}
