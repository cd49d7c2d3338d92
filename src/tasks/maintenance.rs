use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::config::DeliverySettings;
use crate::ledger::DedupLedger;
use crate::metrics::QueueMetrics;
use crate::queue::DeliveryQueue;

/// Intervals and retention windows for the maintenance task
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub interval: Duration,
    /// Terminal results older than this are dropped
    pub result_retention: Duration,
    /// Ledger entries untouched for this long are dropped
    pub ledger_retention: Duration,
}

impl From<&DeliverySettings> for MaintenanceConfig {
    fn from(settings: &DeliverySettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.maintenance_interval_seconds.max(1)),
            result_retention: Duration::from_secs(settings.result_retention_seconds),
            ledger_retention: Duration::from_secs(settings.ledger_retention_seconds),
        }
    }
}

/// What one maintenance pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub leases_reclaimed: usize,
    pub results_purged: usize,
    pub ledger_purged: usize,
}

/// Background task that reclaims expired leases, enforces retention and
/// refreshes the queue gauges.
pub struct MaintenanceTask {
    config: MaintenanceConfig,
    queue: Arc<dyn DeliveryQueue>,
    ledger: Arc<dyn DedupLedger>,
    shutdown: broadcast::Receiver<()>,
}

impl MaintenanceTask {
    pub fn new(
        config: MaintenanceConfig,
        queue: Arc<dyn DeliveryQueue>,
        ledger: Arc<dyn DedupLedger>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            queue,
            ledger,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.config.interval);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            result_retention_secs = self.config.result_retention.as_secs(),
            ledger_retention_secs = self.config.ledger_retention.as_secs(),
            "Maintenance task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Maintenance task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.run_once().await;
                }
            }
        }

        tracing::info!("Maintenance task stopped");
    }

    /// One maintenance pass
    pub async fn run_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        let now = Utc::now();

        match self.queue.reclaim_expired_leases().await {
            Ok(count) => report.leases_reclaimed = count,
            Err(e) => tracing::warn!(error = %e, "Failed to reclaim expired leases"),
        }

        match self
            .queue
            .purge_finished(cutoff(now, self.config.result_retention))
            .await
        {
            Ok(count) => report.results_purged = count,
            Err(e) => tracing::warn!(error = %e, "Failed to purge finished results"),
        }

        match self
            .ledger
            .purge_older_than(cutoff(now, self.config.ledger_retention))
            .await
        {
            Ok(count) => report.ledger_purged = count,
            Err(e) => tracing::warn!(error = %e, "Failed to purge ledger entries"),
        }

        let stats = self.queue.stats().await;
        QueueMetrics::set_depth(stats.pending, stats.in_flight, stats.dead_lettered);

        if report != MaintenanceReport::default() {
            tracing::info!(
                leases_reclaimed = report.leases_reclaimed,
                results_purged = report.results_purged,
                ledger_purged = report.ledger_purged,
                "Maintenance pass completed"
            );
        }
        report
    }
}

fn cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| now.checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{AckDisposition, Channel, DeliveryRequest, DeliveryStatus, RetryPolicy};
    use crate::ledger::{LedgerOutcome, MemoryDedupLedger};
    use crate::queue::{MemoryDeliveryQueue, QueueConfig};
    use uuid::Uuid;

    fn queue(lease_timeout: Duration) -> Arc<MemoryDeliveryQueue> {
        Arc::new(MemoryDeliveryQueue::new(QueueConfig {
            retry: RetryPolicy::default(),
            lease_timeout,
        }))
    }

    fn task(
        queue: Arc<MemoryDeliveryQueue>,
        ledger: Arc<MemoryDedupLedger>,
        retention: Duration,
    ) -> (MaintenanceTask, broadcast::Sender<()>) {
        let (tx, rx) = broadcast::channel(1);
        let config = MaintenanceConfig {
            interval: Duration::from_millis(10),
            result_retention: retention,
            ledger_retention: retention,
        };
        (MaintenanceTask::new(config, queue, ledger, rx), tx)
    }

    #[tokio::test]
    async fn test_reclaims_expired_leases() {
        let queue = queue(Duration::from_millis(5));
        let id = queue
            .enqueue(DeliveryRequest::builder(Channel::Email, "a@x.com", "welcome").build())
            .await
            .unwrap();
        queue.lease(0, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (task, _tx) = task(queue.clone(), Arc::new(MemoryDedupLedger::new()), Duration::from_secs(60));
        let report = task.run_once().await;

        assert_eq!(report.leases_reclaimed, 1);
        assert_eq!(
            queue.status(id).await.unwrap().unwrap().state,
            DeliveryStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_purges_past_retention() {
        let queue = queue(Duration::from_secs(30));
        let ledger = Arc::new(MemoryDedupLedger::new());

        let id = queue
            .enqueue(
                DeliveryRequest::builder(Channel::Email, "a@x.com", "welcome")
                    .dedup_key("old")
                    .build(),
            )
            .await
            .unwrap();
        let job = queue.lease(0, 1).await.unwrap().remove(0);
        let lease_id = job.lease_id().unwrap();
        ledger
            .check_and_reserve("old", id, lease_id, Duration::from_secs(30))
            .await
            .unwrap();
        ledger.commit("old", lease_id, LedgerOutcome::Delivered).await.unwrap();
        queue.ack(id, lease_id, AckDisposition::Delivered).await.unwrap();

        let failed_lease = Uuid::new_v4();
        ledger
            .check_and_reserve("failed", Uuid::new_v4(), failed_lease, Duration::from_secs(30))
            .await
            .unwrap();
        ledger
            .commit(
                "failed",
                failed_lease,
                LedgerOutcome::Failed(crate::delivery::ErrorKind::Permanent),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let (task, _tx) = task(queue.clone(), ledger.clone(), Duration::ZERO);
        let report = task.run_once().await;

        assert_eq!(report.results_purged, 1);
        assert_eq!(report.ledger_purged, 1);
        assert!(queue.status(id).await.unwrap().is_none());
        assert!(ledger.get("failed").await.unwrap().is_none());
        // delivered keys are never forgotten
        assert!(ledger.get("old").await.unwrap().unwrap().is_delivered());
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (task, tx) = task(
            queue(Duration::from_secs(30)),
            Arc::new(MemoryDedupLedger::new()),
            Duration::from_secs(60),
        );
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(25)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_config_from_settings() {
        let settings = DeliverySettings {
            maintenance_interval_seconds: 0,
            ..DeliverySettings::default()
        };
        let config = MaintenanceConfig::from(&settings);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(
            config.ledger_retention,
            Duration::from_secs(settings.ledger_retention_seconds)
        );
    }
}
