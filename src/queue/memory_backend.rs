//! In-memory delivery queue backend using DashMap.
//!
//! Jobs live in sharded maps with per-entry locks; there is no global lock.
//! Jobs and results are lost on restart.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::delivery::{
    AckDisposition, DeadLetterFilter, DeliveryJob, DeliveryRequest, DeliveryResult,
    DeliveryStatus, ErrorInfo, ErrorKind, JobState, LeaseInfo,
};
use crate::metrics::QueueMetrics;

use super::backend::{validate_request, DeliveryQueue, QueueError, QueueStats};
use super::QueueConfig;

/// In-memory delivery queue.
///
/// `jobs` holds pending and leased jobs. `dedup_index` maps a dedup key to the
/// job currently carrying it, so a key is indexed only while its job is
/// pending or leased.
pub struct MemoryDeliveryQueue {
    jobs: DashMap<Uuid, DeliveryJob>,
    dedup_index: DashMap<String, Uuid>,
    dead_letters: DashMap<Uuid, DeliveryJob>,
    finished: DashMap<Uuid, DeliveryResult>,
    config: QueueConfig,
}

impl MemoryDeliveryQueue {
    /// Create a new memory queue with the given configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            jobs: DashMap::new(),
            dedup_index: DashMap::new(),
            dead_letters: DashMap::new(),
            finished: DashMap::new(),
            config,
        }
    }

    fn lease_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.config.lease_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(60))
    }

    /// Claim one job, re-checking eligibility under its entry lock
    fn try_lease(
        &self,
        job_id: Uuid,
        worker_id: usize,
        now: DateTime<Utc>,
    ) -> Result<DeliveryJob, QueueError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::LeaseConflict(job_id))?;

        if !job.is_leasable(now) {
            return Err(QueueError::LeaseConflict(job_id));
        }

        if let Some(ref previous) = job.lease {
            QueueMetrics::record_leases_expired(1);
            tracing::warn!(
                job_id = %job_id,
                previous_worker = previous.worker_id,
                worker_id = worker_id,
                "Re-leasing job after lease expiry"
            );
        }

        job.state = JobState::Leased;
        job.lease = Some(LeaseInfo {
            lease_id: Uuid::new_v4(),
            worker_id,
            leased_at: now,
            expires_at: self.lease_expiry(now),
        });
        job.updated_at = now;

        Ok(job.clone())
    }

    /// Remove the index entry for `dedup_key` if it still points at `job_id`
    fn unindex(&self, dedup_key: &str, job_id: Uuid) {
        self.dedup_index.remove_if(dedup_key, |_, indexed| *indexed == job_id);
    }

    fn finish(&self, result: DeliveryResult) {
        self.finished.insert(result.job_id, result);
    }
}

#[async_trait]
impl DeliveryQueue for MemoryDeliveryQueue {
    async fn enqueue(&self, request: DeliveryRequest) -> Result<Uuid, QueueError> {
        validate_request(&request)?;

        let job_id = request.id;
        if self.jobs.contains_key(&job_id)
            || self.dead_letters.contains_key(&job_id)
            || self.finished.contains_key(&job_id)
        {
            return Err(QueueError::Validation(format!(
                "job {} already exists",
                job_id
            )));
        }

        let channel = request.channel;
        let job = DeliveryJob::new(request);

        match self.dedup_index.entry(job.dedup_key().to_string()) {
            Entry::Occupied(mut indexed) => {
                let existing = *indexed.get();
                let live = self
                    .jobs
                    .get(&existing)
                    .is_some_and(|j| j.state != JobState::DeadLettered);

                if live {
                    QueueMetrics::record_deduplicated();
                    tracing::debug!(
                        job_id = %existing,
                        dedup_key = %indexed.key(),
                        "Duplicate enqueue collapsed onto existing job"
                    );
                    return Ok(existing);
                }

                self.jobs.insert(job_id, job);
                indexed.insert(job_id);
            }
            Entry::Vacant(slot) => {
                self.jobs.insert(job_id, job);
                slot.insert(job_id);
            }
        }

        QueueMetrics::record_submitted(channel.as_str());
        tracing::debug!(job_id = %job_id, "Job enqueued");

        Ok(job_id)
    }

    async fn lease(&self, worker_id: usize, max: usize) -> Result<Vec<DeliveryJob>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();

        // Snapshot candidates first; no entry lock is held while claiming
        let mut candidates: Vec<(i32, DateTime<Utc>, Uuid)> = self
            .jobs
            .iter()
            .filter(|entry| entry.is_leasable(now))
            .map(|entry| (entry.request.priority, entry.request.created_at, entry.id()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut leased = Vec::with_capacity(max.min(candidates.len()));
        for (_, _, job_id) in candidates {
            if leased.len() >= max {
                break;
            }
            match self.try_lease(job_id, worker_id, now) {
                Ok(job) => leased.push(job),
                Err(QueueError::LeaseConflict(_)) => {
                    tracing::trace!(job_id = %job_id, worker_id, "Lease conflict, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(leased)
    }

    async fn ack(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        disposition: AckDisposition,
    ) -> Result<DeliveryResult, QueueError> {
        let (_, job) = self
            .jobs
            .remove_if(&job_id, |_, job| job.is_leased_by(lease_id))
            .ok_or(QueueError::UnknownJob(job_id))?;

        let mut result = DeliveryResult::with_state(&job, disposition.into());
        result.updated_at = Utc::now();

        self.finish(result.clone());
        self.unindex(job.dedup_key(), job_id);

        tracing::debug!(job_id = %job_id, state = ?result.state, "Job acknowledged");
        Ok(result)
    }

    async fn retry(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        error: ErrorInfo,
    ) -> Result<DeliveryResult, QueueError> {
        let now = Utc::now();

        let dead_lettered = {
            let mut job = self
                .jobs
                .get_mut(&job_id)
                .filter(|job| job.is_leased_by(lease_id))
                .ok_or(QueueError::UnknownJob(job_id))?;

            let kind = error.kind;
            job.lease = None;
            job.updated_at = now;
            job.last_error = Some(error);

            let exhausted = match kind {
                ErrorKind::Permanent => true,
                ErrorKind::Transient => {
                    job.attempt += 1;
                    self.config.retry.is_exhausted(job.attempt)
                }
            };

            if !exhausted {
                job.next_attempt_at =
                    self.config
                        .retry
                        .next_attempt_at(job.attempt, now, job.next_attempt_at);
                job.state = JobState::Pending;
                QueueMetrics::record_retry(kind.as_str());
                tracing::info!(
                    job_id = %job_id,
                    attempt = job.attempt,
                    next_attempt_at = %job.next_attempt_at,
                    "Job scheduled for retry"
                );
                return Ok(DeliveryResult::from_job(&job));
            }

            job.state = JobState::DeadLettered;
            QueueMetrics::record_dead_lettered(kind.as_str());
            job.clone()
        };

        // Visible as dead-lettered in both maps until the live entry is gone
        self.dead_letters.insert(job_id, dead_lettered.clone());
        self.jobs.remove(&job_id);
        self.unindex(dead_lettered.dedup_key(), job_id);

        tracing::warn!(
            job_id = %job_id,
            attempt = dead_lettered.attempt,
            error = ?dead_lettered.last_error,
            "Job dead-lettered"
        );

        Ok(DeliveryResult::from_job(&dead_lettered))
    }

    async fn release(
        &self,
        job_id: Uuid,
        lease_id: Uuid,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .filter(|job| job.is_leased_by(lease_id))
            .ok_or(QueueError::UnknownJob(job_id))?;

        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        job.state = JobState::Pending;
        job.lease = None;
        job.next_attempt_at = (now + delay).max(job.next_attempt_at);
        job.updated_at = now;

        tracing::debug!(job_id = %job_id, next_attempt_at = %job.next_attempt_at, "Job released");
        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<DeliveryResult, QueueError> {
        let now = Utc::now();
        // an abandoned lease no longer protects the job
        let removed = self.jobs.remove_if(&job_id, |_, job| match job.state {
            JobState::Pending => true,
            JobState::Leased => job.lease.as_ref().map_or(true, |l| l.is_expired(now)),
            JobState::DeadLettered => false,
        });

        let Some((_, job)) = removed else {
            return match self.jobs.get(&job_id).map(|job| job.state) {
                Some(JobState::Leased) => Err(QueueError::JobInFlight(job_id)),
                _ => Err(QueueError::UnknownJob(job_id)),
            };
        };

        let mut result = DeliveryResult::with_state(&job, DeliveryStatus::Cancelled);
        result.updated_at = now;
        self.finish(result.clone());
        self.unindex(job.dedup_key(), job_id);

        QueueMetrics::record_cancelled();
        tracing::info!(job_id = %job_id, "Job cancelled");
        Ok(result)
    }

    async fn reclaim_expired_leases(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.state == JobState::Leased
                    && entry.lease.as_ref().map_or(true, |l| l.is_expired(now))
            })
            .map(|entry| entry.id())
            .collect();

        let mut reclaimed = 0;
        for job_id in expired {
            if let Some(mut job) = self.jobs.get_mut(&job_id) {
                let still_expired = job.state == JobState::Leased
                    && job.lease.as_ref().map_or(true, |l| l.is_expired(now));
                if still_expired {
                    tracing::warn!(
                        job_id = %job_id,
                        worker_id = ?job.lease.as_ref().map(|l| l.worker_id),
                        "Reclaiming job with expired lease"
                    );
                    job.state = JobState::Pending;
                    job.lease = None;
                    job.updated_at = now;
                    reclaimed += 1;
                }
            }
        }

        if reclaimed > 0 {
            QueueMetrics::record_leases_expired(reclaimed as u64);
        }
        Ok(reclaimed)
    }

    async fn status(&self, job_id: Uuid) -> Result<Option<DeliveryResult>, QueueError> {
        if let Some(job) = self.jobs.get(&job_id) {
            return Ok(Some(DeliveryResult::from_job(&job)));
        }
        if let Some(job) = self.dead_letters.get(&job_id) {
            return Ok(Some(DeliveryResult::from_job(&job)));
        }
        Ok(self.finished.get(&job_id).map(|r| r.clone()))
    }

    async fn list_dead_lettered(
        &self,
        filter: &DeadLetterFilter,
    ) -> Result<Vec<DeliveryJob>, QueueError> {
        let mut jobs: Vec<DeliveryJob> = self
            .dead_letters
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));

        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn take_dead_lettered(&self, job_id: Uuid) -> Result<DeliveryJob, QueueError> {
        let (_, job) = self
            .dead_letters
            .remove(&job_id)
            .ok_or(QueueError::UnknownJob(job_id))?;

        // Keep the original job queryable after it leaves the dead-letter set
        self.finish(DeliveryResult::from_job(&job));
        Ok(job)
    }

    async fn purge_finished(&self, older_than: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut purged = 0;
        self.finished.retain(|_, result| {
            let keep = result.updated_at >= older_than;
            if !keep {
                purged += 1;
            }
            keep
        });

        if purged > 0 {
            tracing::debug!(purged, "Purged finished results");
        }
        Ok(purged)
    }

    async fn stats(&self) -> QueueStats {
        let mut pending = 0;
        let mut in_flight = 0;
        for entry in self.jobs.iter() {
            match entry.state {
                JobState::Pending => pending += 1,
                JobState::Leased => in_flight += 1,
                JobState::DeadLettered => {}
            }
        }

        QueueStats {
            backend_type: "memory".to_string(),
            pending,
            in_flight,
            dead_lettered: self.dead_letters.len(),
            finished: self.finished.len(),
        }
    }
}
