//! Per-job processing: reserve, render, send, report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::delivery::{AckDisposition, DeliveryJob, DeliveryStatus, ErrorInfo, ErrorKind};
use crate::ledger::{DedupLedger, LedgerOutcome, ReserveOutcome};
use crate::metrics::DispatchMetrics;
use crate::queue::{DeliveryQueue, QueueError};
use crate::sender::{SendReceipt, SenderRegistry};
use crate::template::DocumentRenderer;

use super::{DeliveryEvents, DispatchConfig};

/// Fraction of the remaining lease kept back for reporting the outcome
const LEASE_HEADROOM_DIVISOR: u32 = 10;

/// What happened to a leased job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered,
    AlreadyDelivered,
    /// Key in flight under another lease; job released without an attempt
    Deferred,
    /// Failed attempt, scheduled again
    Retrying,
    DeadLettered,
    /// The lease was no longer ours when reporting back
    LeaseLost,
}

/// Drives one leased job through the ledger, renderer and sender.
#[derive(Clone)]
pub struct JobProcessor {
    queue: Arc<dyn DeliveryQueue>,
    ledger: Arc<dyn DedupLedger>,
    renderer: Arc<dyn DocumentRenderer>,
    senders: SenderRegistry,
    events: DeliveryEvents,
    config: DispatchConfig,
}

impl JobProcessor {
    pub fn new(
        queue: Arc<dyn DeliveryQueue>,
        ledger: Arc<dyn DedupLedger>,
        renderer: Arc<dyn DocumentRenderer>,
        senders: SenderRegistry,
        events: DeliveryEvents,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            ledger,
            renderer,
            senders,
            events,
            config,
        }
    }

    /// Process a leased batch, one task per job.
    ///
    /// A panicking task is reported as a transient failure on its job.
    pub async fn process_batch(&self, worker_id: usize, jobs: Vec<DeliveryJob>) -> Vec<JobOutcome> {
        let tasks = jobs.into_iter().map(|job| {
            let processor = self.clone();
            let job_id = job.id();
            let dedup_key = job.dedup_key().to_string();
            let lease_id = job.lease_id();
            let handle = tokio::spawn(async move { processor.process(worker_id, job).await });

            async move {
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        DispatchMetrics::record_panic();
                        tracing::error!(
                            worker_id,
                            job_id = %job_id,
                            error = %join_error,
                            "Delivery task failed unexpectedly"
                        );
                        match lease_id {
                            Some(lease_id) => {
                                self.recover(job_id, &dedup_key, lease_id, join_error.to_string())
                                    .await
                            }
                            None => JobOutcome::LeaseLost,
                        }
                    }
                }
            }
        });

        join_all(tasks).await
    }

    /// Process a single leased job to completion
    #[tracing::instrument(
        name = "dispatch.job",
        skip(self, job),
        fields(
            job_id = %job.id(),
            dedup_key = %job.dedup_key(),
            attempt = job.attempt,
            template_id = %job.request.template_id
        )
    )]
    pub async fn process(&self, worker_id: usize, job: DeliveryJob) -> JobOutcome {
        let Some(lease_id) = job.lease_id() else {
            tracing::warn!("Job handed to worker without a lease");
            return JobOutcome::LeaseLost;
        };
        let job_id = job.id();
        let dedup_key = job.dedup_key();

        match self
            .ledger
            .check_and_reserve(dedup_key, job_id, lease_id, self.config.reservation_ttl)
            .await
        {
            Ok(ReserveOutcome::Reserved) => {}
            Ok(ReserveOutcome::AlreadyDelivered) => {
                tracing::info!("Dedup key already delivered, completing without sending");
                return self
                    .complete(&job, lease_id, AckDisposition::AlreadyDelivered)
                    .await;
            }
            Ok(ReserveOutcome::InFlight) => {
                tracing::debug!("Dedup key in flight elsewhere, releasing job");
                return match self
                    .queue
                    .release(job_id, lease_id, self.config.in_flight_delay)
                    .await
                {
                    Ok(()) => JobOutcome::Deferred,
                    Err(e) => self.lease_lost("release", e),
                };
            }
            Err(e) => {
                // nothing reserved, so the ledger has nothing to release
                tracing::warn!(error = %e, "Ledger unavailable");
                return self
                    .fail(&job, lease_id, ErrorInfo::transient(e.to_string()))
                    .await;
            }
        }

        match self.deliver(&job, self.delivery_deadline(&job)).await {
            Ok(receipt) => {
                if let Err(e) = self
                    .ledger
                    .commit(dedup_key, lease_id, LedgerOutcome::Delivered)
                    .await
                {
                    tracing::error!(error = %e, "Failed to record delivery in ledger");
                }
                tracing::debug!(provider_response = ?receipt.provider_response, "Document sent");
                self.complete(&job, lease_id, AckDisposition::Delivered).await
            }
            Err(error) => {
                if let Err(e) = self
                    .ledger
                    .commit(dedup_key, lease_id, LedgerOutcome::Failed(error.kind))
                    .await
                {
                    tracing::warn!(error = %e, "Failed to release ledger reservation");
                }
                self.fail(&job, lease_id, error).await
            }
        }
    }

    /// Deadline for rendering and sending: `send_timeout`, cut short so the
    /// job is reported while its lease and ledger reservation still hold.
    fn delivery_deadline(&self, job: &DeliveryJob) -> tokio::time::Instant {
        let lease_left = job
            .lease
            .as_ref()
            .and_then(|lease| (lease.expires_at - Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO);
        let budget = self
            .config
            .send_timeout
            .min(lease_left.saturating_sub(lease_left / LEASE_HEADROOM_DIVISOR));
        tokio::time::Instant::now() + budget
    }

    /// Render the template and hand it to the channel sender before `deadline`
    async fn deliver(
        &self,
        job: &DeliveryJob,
        deadline: tokio::time::Instant,
    ) -> Result<SendReceipt, ErrorInfo> {
        let request = &job.request;
        let channel = request.channel.as_str();

        let sender = self.senders.get(request.channel).ok_or_else(|| {
            ErrorInfo::permanent(format!("no sender registered for channel {}", channel))
        })?;

        let started = Instant::now();
        let document = tokio::time::timeout_at(
            deadline,
            self.renderer.render(&request.template_id, &request.context),
        )
        .await
        .map_err(|_| ErrorInfo::transient("rendering did not finish before the lease deadline"))?
        .map_err(|e| {
            tracing::warn!(error = %e, "Rendering failed");
            ErrorInfo::from(e)
        })?;
        DispatchMetrics::record_render(started.elapsed());

        let started = Instant::now();
        let result = match tokio::time::timeout_at(
            deadline,
            sender.send(&request.recipient, &document),
        )
        .await
        {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(e)) => Err(ErrorInfo::from(e)),
            Err(_) => Err(ErrorInfo::transient(format!(
                "send abandoned after {}ms",
                started.elapsed().as_millis()
            ))),
        };
        DispatchMetrics::record_send(channel, started.elapsed());

        if let Err(ref error) = result {
            DispatchMetrics::record_send_error(channel, error.kind.as_str());
            tracing::warn!(kind = error.kind.as_str(), error = %error.message, "Send failed");
        }
        result
    }

    async fn complete(
        &self,
        job: &DeliveryJob,
        lease_id: Uuid,
        disposition: AckDisposition,
    ) -> JobOutcome {
        match self.queue.ack(job.id(), lease_id, disposition).await {
            Ok(result) => {
                self.events.publish(&result);
                match disposition {
                    AckDisposition::Delivered => {
                        DispatchMetrics::record_delivered(job.request.channel.as_str());
                        tracing::info!("Delivery completed");
                        JobOutcome::Delivered
                    }
                    AckDisposition::AlreadyDelivered => {
                        DispatchMetrics::record_already_delivered();
                        JobOutcome::AlreadyDelivered
                    }
                }
            }
            Err(e) => self.lease_lost("ack", e),
        }
    }

    async fn fail(&self, job: &DeliveryJob, lease_id: Uuid, error: ErrorInfo) -> JobOutcome {
        match self.queue.retry(job.id(), lease_id, error).await {
            Ok(result) if result.state == DeliveryStatus::DeadLettered => {
                self.events.publish(&result);
                JobOutcome::DeadLettered
            }
            Ok(_) => JobOutcome::Retrying,
            Err(e) => self.lease_lost("retry", e),
        }
    }

    /// Report a job whose task panicked as a transient failure
    async fn recover(
        &self,
        job_id: Uuid,
        dedup_key: &str,
        lease_id: Uuid,
        reason: String,
    ) -> JobOutcome {
        if let Err(e) = self
            .ledger
            .commit(dedup_key, lease_id, LedgerOutcome::Failed(ErrorKind::Transient))
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to release ledger reservation");
        }

        let error = ErrorInfo::transient(format!("delivery task failed: {}", reason));
        match self.queue.retry(job_id, lease_id, error).await {
            Ok(result) if result.state == DeliveryStatus::DeadLettered => {
                self.events.publish(&result);
                JobOutcome::DeadLettered
            }
            Ok(_) => JobOutcome::Retrying,
            Err(e) => self.lease_lost("retry", e),
        }
    }

    fn lease_lost(&self, operation: &str, error: QueueError) -> JobOutcome {
        match error {
            QueueError::UnknownJob(_) | QueueError::LeaseConflict(_) => {
                tracing::warn!(operation, error = %error, "Lease expired before the job was reported");
            }
            _ => {
                tracing::error!(operation, error = %error, "Queue rejected job report");
            }
        }
        JobOutcome::LeaseLost
    }
}
