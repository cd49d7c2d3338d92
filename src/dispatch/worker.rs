use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::queue::DeliveryQueue;

use super::JobProcessor;

/// A single dispatch worker.
///
/// Leases a batch, processes it to completion and polls again; sleeps for
/// `poll_interval` when nothing is due. A stop signal is honoured between
/// batches so leased jobs are always reported back.
pub struct DeliveryWorker {
    id: usize,
    queue: Arc<dyn DeliveryQueue>,
    processor: JobProcessor,
    batch_size: usize,
    poll_interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl DeliveryWorker {
    pub fn new(
        id: usize,
        queue: Arc<dyn DeliveryQueue>,
        processor: JobProcessor,
        batch_size: usize,
        poll_interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            id,
            queue,
            processor,
            batch_size: batch_size.max(1),
            poll_interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(worker_id = self.id, "Delivery worker started");

        loop {
            match self.shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            let processed = match self.queue.lease(self.id, self.batch_size).await {
                Ok(jobs) if jobs.is_empty() => 0,
                Ok(jobs) => {
                    tracing::debug!(worker_id = self.id, count = jobs.len(), "Leased jobs");
                    self.processor.process_batch(self.id, jobs).await.len()
                }
                Err(e) => {
                    tracing::warn!(worker_id = self.id, error = %e, "Failed to lease jobs");
                    0
                }
            };

            if processed == 0 {
                tokio::select! {
                    _ = self.shutdown.recv() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        tracing::debug!(worker_id = self.id, "Delivery worker stopped");
    }
}
