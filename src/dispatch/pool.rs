//! Supervised set of dispatch workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::metrics::DispatchMetrics;
use crate::queue::DeliveryQueue;

use super::{DeliveryWorker, DispatchConfig, DispatchError, JobProcessor};

/// Worker tasks spawned by the engine.
///
/// Workers run until a stop signal arrives on the shared shutdown channel;
/// `shutdown_graceful` waits for them to finish their current batch.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers
    pub fn spawn(
        config: &DispatchConfig,
        queue: Arc<dyn DeliveryQueue>,
        processor: JobProcessor,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Self {
        tracing::info!(
            worker_count = config.worker_count,
            batch_size = config.batch_size,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Spawning delivery workers"
        );

        let handles = (0..config.worker_count)
            .map(|worker_id| {
                let worker = DeliveryWorker::new(
                    worker_id,
                    queue.clone(),
                    processor.clone(),
                    config.batch_size,
                    config.poll_interval,
                    shutdown_tx.subscribe(),
                );
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();

        DispatchMetrics::set_workers(handles.len());
        Self { handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn has_active_workers(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Wait for workers to stop after the stop signal has been sent.
    pub async fn shutdown_graceful(self, timeout: Duration) -> Result<(), DispatchError> {
        tracing::info!(
            worker_count = self.handles.len(),
            timeout_secs = timeout.as_secs(),
            "Waiting for delivery workers to finish"
        );

        let join_all = async {
            let mut panicked = 0;
            for (worker_id, handle) in self.handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    panicked += 1;
                    DispatchMetrics::record_panic();
                    tracing::error!(
                        worker_id,
                        error = %join_error,
                        "Delivery worker terminated abnormally"
                    );
                }
            }
            panicked
        };

        let result = match tokio::time::timeout(timeout, join_all).await {
            Ok(panicked) => {
                if panicked > 0 {
                    tracing::warn!(panicked, "Some workers did not stop cleanly");
                }
                tracing::info!("Delivery workers stopped");
                Ok(())
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = timeout.as_secs(),
                    "Worker shutdown timed out, some jobs may still be leased"
                );
                Err(DispatchError::ShutdownTimeout { timeout })
            }
        };

        DispatchMetrics::set_workers(0);
        result
    }
}
