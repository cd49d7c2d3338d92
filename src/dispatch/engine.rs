//! Delivery engine: the entry point used by callers and the HTTP layer.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::delivery::{DeadLetterFilter, DeliveryJob, DeliveryRequest, DeliveryResult};
use crate::ledger::{DedupLedger, LedgerStats};
use crate::queue::{DeliveryQueue, QueueError, QueueStats};
use crate::sender::SenderRegistry;
use crate::template::DocumentRenderer;

use super::{
    DeliveryEvents, DispatchConfig, DispatchError, JobOutcome, JobProcessor, WorkerPool,
    EVENT_CHANNEL_CAPACITY,
};

/// Snapshot of engine state for health and operator views
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub running: bool,
    pub workers: usize,
    pub queue: QueueStats,
    pub ledger: LedgerStats,
}

/// Owns the queue, ledger and worker pool.
///
/// Constructed explicitly; `start` spawns the workers and `shutdown` stops
/// them after in-flight jobs are reported.
pub struct DeliveryEngine {
    queue: Arc<dyn DeliveryQueue>,
    ledger: Arc<dyn DedupLedger>,
    processor: JobProcessor,
    events: DeliveryEvents,
    config: DispatchConfig,
    shutdown_tx: broadcast::Sender<()>,
    pool: Mutex<Option<WorkerPool>>,
}

impl DeliveryEngine {
    pub fn new(
        queue: Arc<dyn DeliveryQueue>,
        ledger: Arc<dyn DedupLedger>,
        renderer: Arc<dyn DocumentRenderer>,
        senders: SenderRegistry,
        config: DispatchConfig,
    ) -> Self {
        let events = DeliveryEvents::new(EVENT_CHANNEL_CAPACITY);
        let processor = JobProcessor::new(
            queue.clone(),
            ledger.clone(),
            renderer,
            senders,
            events.clone(),
            config.clone(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            queue,
            ledger,
            processor,
            events,
            config,
            shutdown_tx,
            pool: Mutex::new(None),
        }
    }

    /// Accept a request; returns the existing job ID for a live duplicate.
    #[tracing::instrument(
        name = "engine.submit",
        skip(self, request),
        fields(request_id = %request.id, dedup_key = %request.dedup_key, template_id = %request.template_id)
    )]
    pub async fn submit(&self, request: DeliveryRequest) -> Result<Uuid, QueueError> {
        let request_id = request.id;
        let job_id = self.queue.enqueue(request).await?;
        if job_id != request_id {
            tracing::debug!(existing_job_id = %job_id, "Duplicate submission joined existing job");
        }
        Ok(job_id)
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<Option<DeliveryResult>, QueueError> {
        self.queue.status(job_id).await
    }

    /// Withdraw a pending job
    pub async fn cancel(&self, job_id: Uuid) -> Result<DeliveryResult, QueueError> {
        let result = self.queue.cancel(job_id).await?;
        tracing::info!(job_id = %job_id, "Delivery cancelled");
        self.events.publish(&result);
        Ok(result)
    }

    pub async fn list_dead_lettered(
        &self,
        filter: &DeadLetterFilter,
    ) -> Result<Vec<DeliveryJob>, QueueError> {
        self.queue.list_dead_lettered(filter).await
    }

    /// Re-submit a dead-lettered request as a fresh job.
    ///
    /// The new job keeps the dedup key, so a key delivered in the meantime
    /// completes as already delivered.
    #[tracing::instrument(name = "engine.redrive", skip(self))]
    pub async fn redrive(&self, job_id: Uuid) -> Result<Uuid, QueueError> {
        let job = self.queue.take_dead_lettered(job_id).await?;
        let new_id = self.queue.enqueue(job.request.resubmission()).await?;
        tracing::info!(new_job_id = %new_id, "Dead-lettered job re-driven");
        Ok(new_id)
    }

    /// Receive terminal results as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryResult> {
        self.events.subscribe()
    }

    /// Receiver for the stop signal shared with background tasks
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn queue(&self) -> Arc<dyn DeliveryQueue> {
        self.queue.clone()
    }

    pub fn ledger(&self) -> Arc<dyn DedupLedger> {
        self.ledger.clone()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Spawn the worker pool
    pub async fn start(&self) -> Result<(), DispatchError> {
        let mut pool = self.pool.lock().await;
        if pool.is_some() {
            return Err(DispatchError::AlreadyRunning);
        }

        *pool = Some(WorkerPool::spawn(
            &self.config,
            self.queue.clone(),
            self.processor.clone(),
            &self.shutdown_tx,
        ));
        tracing::info!("Delivery engine started");
        Ok(())
    }

    /// Signal workers and background tasks to stop and wait up to
    /// `timeout` for the workers to finish their current batch.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), DispatchError> {
        let _ = self.shutdown_tx.send(());

        let pool = self.pool.lock().await.take();
        match pool {
            Some(pool) => pool.shutdown_graceful(timeout).await,
            None => Ok(()),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.pool
            .lock()
            .await
            .as_ref()
            .is_some_and(|pool| pool.has_active_workers())
    }

    /// Lease and process one batch on the calling task
    pub async fn process_once(&self) -> Result<Vec<JobOutcome>, QueueError> {
        const INLINE_WORKER_ID: usize = usize::MAX;

        let jobs = self.queue.lease(INLINE_WORKER_ID, self.config.batch_size).await?;
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.processor.process_batch(INLINE_WORKER_ID, jobs).await)
    }

    pub async fn stats(&self) -> EngineStats {
        let workers = self
            .pool
            .lock()
            .await
            .as_ref()
            .map_or(0, |pool| pool.worker_count());

        EngineStats {
            running: workers > 0,
            workers,
            queue: self.queue.stats().await,
            ledger: self.ledger.stats().await,
        }
    }
}
