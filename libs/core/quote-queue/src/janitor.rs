//! Janitor: periodic lease recovery and retention sweep.

use crate::error::QueueError;
use crate::metrics::QueueMetrics;
use crate::store::QueueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Floor for the sweep period, `tokio::time::interval` rejects zero
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Janitor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JanitorConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Terminal messages older than this are purged
    pub retention: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl JanitorConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// Result of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired leases resolved as failures
    pub reclaimed: usize,
    /// Terminal messages removed
    pub purged: usize,
}

pub struct Janitor {
    store: Arc<dyn QueueStore>,
    config: JanitorConfig,
    metrics: QueueMetrics,
}

impl Janitor {
    pub fn new(store: Arc<dyn QueueStore>, config: JanitorConfig) -> Self {
        let metrics = QueueMetrics::new(store.backend());
        Self {
            store,
            config,
            metrics,
        }
    }

    /// Reclaim leases that expired before `now`, then purge terminal messages
    /// that finished before `now - retention`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, QueueError> {
        let reclaimed = self.store.reclaim_expired(now).await?;
        if reclaimed > 0 {
            self.metrics.leases_reclaimed(reclaimed);
        }

        let retention = chrono::Duration::from_std(self.config.retention)
            .map_err(|e| QueueError::Config(format!("Retention out of range: {e}")))?;
        let cutoff = now - retention;
        let purged = self.store.purge_terminal(cutoff).await?;
        if purged > 0 {
            self.metrics.messages_purged(purged);
        }

        Ok(SweepReport { reclaimed, purged })
    }

    /// Sweep every `interval` until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            backend = %self.store.backend(),
            interval_secs = self.config.interval.as_secs(),
            retention_secs = self.config.retention.as_secs(),
            "Starting janitor"
        );

        let mut ticker = tokio::time::interval(self.config.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) if report != SweepReport::default() => {
                            info!(reclaimed = report.reclaimed, purged = report.purged, "Janitor sweep");
                        }
                        Ok(_) => debug!("Janitor sweep found nothing to do"),
                        Err(e) => {
                            self.metrics.backend_error("sweep");
                            warn!(error = %e, "Janitor sweep failed, retrying next tick");
                        }
                    }
                }
            }
        }

        info!("Janitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EnqueueOptions, MessageStatus, Payload};
    use crate::store::{Backend, MemoryStore, MockQueueStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_sweep_reclaims_and_purges() {
        let store = Arc::new(MemoryStore::new(10));
        let janitor = Janitor::new(store.clone(), JanitorConfig::default());

        let stuck = store
            .enqueue(
                Payload::new(),
                EnqueueOptions::default().with_timeout_seconds(1),
            )
            .await
            .unwrap();
        store.lease_next().await.unwrap().unwrap();

        let now = Utc::now() + chrono::Duration::seconds(5);
        let report = janitor.sweep(now).await.unwrap();
        assert_eq!(report, SweepReport { reclaimed: 1, purged: 0 });
        assert_eq!(
            store.get(stuck).await.unwrap().unwrap().status,
            MessageStatus::Pending
        );

        // Idempotent
        assert_eq!(janitor.sweep(now).await.unwrap(), SweepReport::default());

        store.lease_next().await.unwrap().unwrap();
        store.complete(stuck, json!({})).await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(25);
        let report = janitor.sweep(later).await.unwrap();
        assert_eq!(report.purged, 1);
        assert!(store.get(stuck).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_uses_retention_cutoff() {
        let now = Utc::now();
        let mut store = MockQueueStore::new();
        store.expect_backend().return_const(Backend::Memory);
        store
            .expect_reclaim_expired()
            .withf(move |at| *at == now)
            .returning(|_| Ok(0));
        store
            .expect_purge_terminal()
            .withf(move |cutoff| *cutoff == now - chrono::Duration::hours(2))
            .returning(|_| Ok(3));

        let janitor = Janitor::new(
            Arc::new(store),
            JanitorConfig::default().with_retention(Duration::from_secs(7200)),
        );
        let report = janitor.sweep(now).await.unwrap();
        assert_eq!(report, SweepReport { reclaimed: 0, purged: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_zero_interval_keeps_sweeping() {
        let mut store = MockQueueStore::new();
        store.expect_backend().return_const(Backend::Memory);
        store.expect_reclaim_expired().returning(|_| Ok(0));
        store.expect_purge_terminal().returning(|_| Ok(0));

        let janitor = Janitor::new(
            Arc::new(store),
            JanitorConfig::default().with_interval(Duration::ZERO),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { janitor.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_backend_errors_and_stops() {
        let mut store = MockQueueStore::new();
        store.expect_backend().return_const(Backend::Redis);
        store
            .expect_reclaim_expired()
            .returning(|_| Err(QueueError::unavailable("connection refused")));

        let janitor = Janitor::new(
            Arc::new(store),
            JanitorConfig::default().with_interval(Duration::from_secs(1)),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { janitor.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
