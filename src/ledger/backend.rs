//! Backend trait for the idempotency ledger.
//!
//! The ledger remembers, per dedup key, whether a delivery already succeeded
//! and which lease currently holds the right to send. It outlives individual
//! jobs, so a request re-submitted after success is recognised.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::delivery::ErrorKind;

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Backend is temporarily unavailable
    #[error("Ledger backend unavailable: {0}")]
    Unavailable(String),
}

/// Outcome recorded for the latest attempt on a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "kind", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Delivered,
    Failed(ErrorKind),
}

/// Result of trying to reserve a key for sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The caller holds the key and may send
    Reserved,
    /// A previous job already delivered this key
    AlreadyDelivered,
    /// Another lease holds an unexpired reservation
    InFlight,
}

/// Exclusive right to send for one key, held by one lease
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub job_id: Uuid,
    pub lease_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Ledger record for one dedup key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub dedup_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<LedgerOutcome>,
    pub last_attempt_at: DateTime<Utc>,
    /// Committed attempts across all jobs carrying this key
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
}

impl LedgerEntry {
    pub fn new(dedup_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            dedup_key: dedup_key.into(),
            last_outcome: None,
            last_attempt_at: now,
            attempts: 0,
            delivered_job_id: None,
            reservation: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.last_outcome == Some(LedgerOutcome::Delivered)
    }

    /// Whether some lease other than `lease_id` holds a live reservation
    pub fn is_reserved_by_other(&self, lease_id: Uuid, now: DateTime<Utc>) -> bool {
        self.reservation
            .as_ref()
            .is_some_and(|r| r.lease_id != lease_id && !r.is_expired(now))
    }
}

/// Statistics about the ledger backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    pub backend_type: String,
    pub entries: usize,
    pub delivered: usize,
    pub reserved: usize,
}

/// Backend trait for dedup ledger storage.
///
/// All operations on one key must be atomic with respect to each other.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    /// Atomically check a key and, unless it is delivered or held by another
    /// live lease, reserve it for `lease_id` for `ttl`.
    async fn check_and_reserve(
        &self,
        dedup_key: &str,
        job_id: Uuid,
        lease_id: Uuid,
        ttl: Duration,
    ) -> Result<ReserveOutcome, LedgerError>;

    /// Record the outcome of an attempt.
    ///
    /// `Delivered` is final and is never replaced by a later failure. A
    /// failure releases the reservation held by `lease_id`.
    async fn commit(
        &self,
        dedup_key: &str,
        lease_id: Uuid,
        outcome: LedgerOutcome,
    ) -> Result<(), LedgerError>;

    /// Look up the entry for a key.
    async fn get(&self, dedup_key: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Drop undelivered, unreserved entries whose last attempt is older than
    /// `cutoff`. Delivered keys are kept.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, LedgerError>;

    /// Get ledger statistics.
    async fn stats(&self) -> LedgerStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(
            serde_json::to_value(LedgerOutcome::Delivered).unwrap(),
            serde_json::json!({"outcome": "delivered"})
        );
        assert_eq!(
            serde_json::to_value(LedgerOutcome::Failed(ErrorKind::Transient)).unwrap(),
            serde_json::json!({"outcome": "failed", "kind": "transient"})
        );
    }

    #[test]
    fn test_reserved_by_other() {
        let now = Utc::now();
        let holder = Uuid::new_v4();
        let mut entry = LedgerEntry::new("k", now);
        assert!(!entry.is_reserved_by_other(holder, now));

        entry.reservation = Some(Reservation {
            job_id: Uuid::new_v4(),
            lease_id: holder,
            expires_at: now + chrono::Duration::seconds(10),
        });
        assert!(!entry.is_reserved_by_other(holder, now));
        assert!(entry.is_reserved_by_other(Uuid::new_v4(), now));
        assert!(!entry.is_reserved_by_other(
            Uuid::new_v4(),
            now + chrono::Duration::seconds(11)
        ));
    }
}
