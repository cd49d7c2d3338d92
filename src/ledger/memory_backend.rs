//! In-memory dedup ledger using DashMap.
//!
//! Every operation on a key runs under that key's entry lock, which makes
//! check-and-reserve atomic without a global lock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::backend::{
    DedupLedger, LedgerEntry, LedgerError, LedgerOutcome, LedgerStats, Reservation,
    ReserveOutcome,
};

/// In-memory dedup ledger.
#[derive(Default)]
pub struct MemoryDedupLedger {
    entries: DashMap<String, LedgerEntry>,
}

impl MemoryDedupLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn reservation(job_id: Uuid, lease_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> Reservation {
    Reservation {
        job_id,
        lease_id,
        expires_at: now
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(60)),
    }
}

#[async_trait]
impl DedupLedger for MemoryDedupLedger {
    async fn check_and_reserve(
        &self,
        dedup_key: &str,
        job_id: Uuid,
        lease_id: Uuid,
        ttl: Duration,
    ) -> Result<ReserveOutcome, LedgerError> {
        let now = Utc::now();

        match self.entries.entry(dedup_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_delivered() {
                    return Ok(ReserveOutcome::AlreadyDelivered);
                }
                if entry.is_reserved_by_other(lease_id, now) {
                    tracing::debug!(
                        dedup_key = %dedup_key,
                        job_id = %job_id,
                        "Dedup key reserved by another lease"
                    );
                    return Ok(ReserveOutcome::InFlight);
                }
                entry.reservation = Some(reservation(job_id, lease_id, now, ttl));
                entry.last_attempt_at = now;
            }
            Entry::Vacant(vacant) => {
                let mut entry = LedgerEntry::new(dedup_key, now);
                entry.reservation = Some(reservation(job_id, lease_id, now, ttl));
                vacant.insert(entry);
            }
        }

        Ok(ReserveOutcome::Reserved)
    }

    async fn commit(
        &self,
        dedup_key: &str,
        lease_id: Uuid,
        outcome: LedgerOutcome,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        let mut entry = self
            .entries
            .entry(dedup_key.to_string())
            .or_insert_with(|| LedgerEntry::new(dedup_key, now));

        let held_by_caller = entry
            .reservation
            .as_ref()
            .is_some_and(|r| r.lease_id == lease_id);
        let job_id = entry.reservation.as_ref().map(|r| r.job_id);

        entry.attempts += 1;
        entry.last_attempt_at = now;

        match outcome {
            LedgerOutcome::Delivered => {
                if entry.is_delivered() {
                    tracing::warn!(dedup_key = %dedup_key, "Key delivered more than once");
                } else {
                    entry.last_outcome = Some(LedgerOutcome::Delivered);
                    if held_by_caller {
                        entry.delivered_job_id = job_id;
                    }
                }
                // a stale lease must not drop the current holder's reservation
                if held_by_caller {
                    entry.reservation = None;
                }
            }
            LedgerOutcome::Failed(kind) => {
                if !entry.is_delivered() {
                    entry.last_outcome = Some(LedgerOutcome::Failed(kind));
                }
                if held_by_caller {
                    entry.reservation = None;
                }
            }
        }

        Ok(())
    }

    async fn get(&self, dedup_key: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.entries.get(dedup_key).map(|e| e.clone()))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, LedgerError> {
        let now = Utc::now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            // delivered keys are kept for good so resubmissions stay no-ops
            let live_reservation = entry.reservation.as_ref().is_some_and(|r| !r.is_expired(now));
            let keep = entry.is_delivered() || live_reservation || entry.last_attempt_at >= cutoff;
            if !keep {
                purged += 1;
            }
            keep
        });

        if purged > 0 {
            tracing::debug!(purged, "Purged ledger entries");
        }
        Ok(purged)
    }

    async fn stats(&self) -> LedgerStats {
        let now = Utc::now();
        let mut delivered = 0;
        let mut reserved = 0;
        for entry in self.entries.iter() {
            if entry.is_delivered() {
                delivered += 1;
            }
            if entry.reservation.as_ref().is_some_and(|r| !r.is_expired(now)) {
                reserved += 1;
            }
        }

        LedgerStats {
            backend_type: "memory".to_string(),
            entries: self.entries.len(),
            delivered,
            reserved,
        }
    }
}
