//! Queue statistics and the stats collector.

use crate::error::QueueError;
use crate::message::{Message, MessageStatus};
use crate::metrics::QueueMetrics;
use crate::store::QueueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Cumulative counters kept by each backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    pub total_enqueued: u64,
    pub total_leased: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retries: u64,
    pub total_cancelled: u64,
    pub total_reclaimed: u64,
    pub total_purged: u64,
}

impl QueueCounters {
    /// Build from a field -> value map (the Redis stats hash)
    pub fn from_fields(fields: &HashMap<String, u64>) -> Self {
        let get = |key: &str| fields.get(key).copied().unwrap_or(0);
        Self {
            total_enqueued: get("total_enqueued"),
            total_leased: get("total_leased"),
            total_completed: get("total_completed"),
            total_failed: get("total_failed"),
            total_retries: get("total_retries"),
            total_cancelled: get("total_cancelled"),
            total_reclaimed: get("total_reclaimed"),
            total_purged: get("total_purged"),
        }
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending_count: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub max_size: usize,
    /// Age of the oldest PENDING message, in seconds
    pub oldest_pending_age_secs: Option<f64>,
    /// Longest running lease, in seconds
    pub longest_processing_age_secs: Option<f64>,
    pub counters: QueueCounters,
}

impl QueueStats {
    pub fn oldest_pending_age(&self) -> Option<Duration> {
        self.oldest_pending_age_secs.map(Duration::from_secs_f64)
    }

    pub fn longest_processing_age(&self) -> Option<Duration> {
        self.longest_processing_age_secs.map(Duration::from_secs_f64)
    }

    /// Messages still held by the queue in any status
    pub fn total_count(&self) -> usize {
        self.pending_count
            + self.processing_count
            + self.completed_count
            + self.failed_count
            + self.cancelled_count
    }

    /// Fraction of the capacity used by PENDING messages
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            return 1.0;
        }
        self.pending_count as f64 / self.max_size as f64
    }
}

/// Folds messages into a [`QueueStats`], shared by both backends
#[derive(Debug)]
pub(crate) struct StatsAccumulator {
    now: DateTime<Utc>,
    stats: QueueStats,
}

impl StatsAccumulator {
    pub(crate) fn new(now: DateTime<Utc>, max_size: usize) -> Self {
        Self {
            now,
            stats: QueueStats {
                max_size,
                ..QueueStats::default()
            },
        }
    }

    pub(crate) fn observe(&mut self, message: &Message) {
        let age = message.age(self.now).num_milliseconds() as f64 / 1000.0;
        match message.status {
            MessageStatus::Pending => {
                self.stats.pending_count += 1;
                raise(&mut self.stats.oldest_pending_age_secs, age);
            }
            MessageStatus::Processing => {
                self.stats.processing_count += 1;
                raise(&mut self.stats.longest_processing_age_secs, age);
            }
            MessageStatus::Completed => self.stats.completed_count += 1,
            MessageStatus::Failed => self.stats.failed_count += 1,
            MessageStatus::Cancelled => self.stats.cancelled_count += 1,
        }
    }

    pub(crate) fn finish(mut self, counters: QueueCounters) -> QueueStats {
        self.stats.counters = counters;
        self.stats
    }
}

fn raise(slot: &mut Option<f64>, value: f64) {
    *slot = Some(slot.map_or(value, |current| current.max(value)));
}

/// Alert thresholds evaluated on every collection
#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    /// Alert when more than this many messages are PENDING
    pub max_pending: usize,
    /// Alert when a lease has been running longer than this
    pub stalled_after: Duration,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_pending: 800,
            stalled_after: Duration::from_secs(600),
        }
    }
}

impl AlertThresholds {
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_stalled_after(mut self, stalled_after: Duration) -> Self {
        self.stalled_after = stalled_after;
        self
    }

    pub fn evaluate(&self, stats: &QueueStats) -> Vec<QueueAlert> {
        let mut alerts = Vec::new();

        if stats.pending_count > self.max_pending {
            alerts.push(QueueAlert::DepthExceeded {
                pending: stats.pending_count,
                threshold: self.max_pending,
            });
        }

        if let Some(longest) = stats.longest_processing_age() {
            if longest > self.stalled_after {
                alerts.push(QueueAlert::StalledLease {
                    longest,
                    threshold: self.stalled_after,
                });
            }
        }

        alerts
    }
}

/// A threshold crossed by the current queue state
#[derive(Debug, Clone, PartialEq)]
pub enum QueueAlert {
    DepthExceeded { pending: usize, threshold: usize },
    StalledLease { longest: Duration, threshold: Duration },
}

impl std::fmt::Display for QueueAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueAlert::DepthExceeded { pending, threshold } => {
                write!(f, "{pending} pending messages exceed threshold {threshold}")
            }
            QueueAlert::StalledLease { longest, threshold } => write!(
                f,
                "a lease has been processing for {}s (threshold {}s)",
                longest.as_secs(),
                threshold.as_secs()
            ),
        }
    }
}

/// Reads stats from a store, publishes gauges and evaluates alerts.
#[derive(Clone)]
pub struct StatsCollector {
    store: Arc<dyn QueueStore>,
    thresholds: AlertThresholds,
    metrics: QueueMetrics,
}

impl StatsCollector {
    pub fn new(store: Arc<dyn QueueStore>, thresholds: AlertThresholds) -> Self {
        let metrics = QueueMetrics::new(store.backend());
        Self {
            store,
            thresholds,
            metrics,
        }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Snapshot the store and update the gauges
    pub async fn collect(&self) -> Result<QueueStats, QueueError> {
        let stats = self.store.stats(Utc::now()).await?;
        self.metrics.record_stats(&stats);
        Ok(stats)
    }

    /// Snapshot the store and log every crossed threshold
    pub async fn check(&self) -> Result<(QueueStats, Vec<QueueAlert>), QueueError> {
        let stats = self.collect().await?;
        let alerts = self.thresholds.evaluate(&stats);
        for alert in &alerts {
            warn!(backend = %self.store.backend(), alert = %alert, "Queue alert");
        }
        Ok((stats, alerts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EnqueueOptions, Payload};
    use crate::store::{Backend, MockQueueStore};
    use chrono::Duration as ChronoDuration;

    fn message_at(created_at: DateTime<Utc>) -> Message {
        Message::new(Payload::new(), EnqueueOptions::default(), created_at)
    }

    #[test]
    fn test_accumulator_counts_and_ages() {
        let now = Utc::now();
        let mut acc = StatsAccumulator::new(now, 10);

        acc.observe(&message_at(now - ChronoDuration::seconds(30)));
        acc.observe(&message_at(now - ChronoDuration::seconds(5)));

        let mut leased = message_at(now - ChronoDuration::seconds(100));
        leased.begin_lease(now - ChronoDuration::seconds(20)).unwrap();
        acc.observe(&leased);

        let mut cancelled = message_at(now);
        cancelled.cancel(now).unwrap();
        acc.observe(&cancelled);

        let stats = acc.finish(QueueCounters {
            total_enqueued: 4,
            ..QueueCounters::default()
        });

        assert_eq!(stats.pending_count, 2);
        assert_eq!(stats.processing_count, 1);
        assert_eq!(stats.cancelled_count, 1);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.oldest_pending_age_secs, Some(30.0));
        assert_eq!(stats.longest_processing_age_secs, Some(20.0));
        assert_eq!(stats.counters.total_enqueued, 4);
        assert_eq!(stats.total_count(), 4);
        assert!((stats.utilization() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_queue_has_no_ages() {
        let stats = StatsAccumulator::new(Utc::now(), 5).finish(QueueCounters::default());
        assert_eq!(stats.oldest_pending_age(), None);
        assert_eq!(stats.longest_processing_age(), None);
    }

    #[test]
    fn test_counters_from_fields() {
        let fields = HashMap::from([
            ("total_enqueued".to_string(), 7),
            ("total_retries".to_string(), 2),
            ("sequence".to_string(), 7),
        ]);
        let counters = QueueCounters::from_fields(&fields);
        assert_eq!(counters.total_enqueued, 7);
        assert_eq!(counters.total_retries, 2);
        assert_eq!(counters.total_completed, 0);
    }

    #[test]
    fn test_alert_thresholds() {
        let thresholds = AlertThresholds::default()
            .with_max_pending(2)
            .with_stalled_after(Duration::from_secs(60));

        let quiet = QueueStats {
            pending_count: 2,
            longest_processing_age_secs: Some(60.0),
            ..QueueStats::default()
        };
        assert!(thresholds.evaluate(&quiet).is_empty());

        let busy = QueueStats {
            pending_count: 3,
            longest_processing_age_secs: Some(61.0),
            ..QueueStats::default()
        };
        let alerts = thresholds.evaluate(&busy);
        assert_eq!(alerts.len(), 2);
        assert!(matches!(
            alerts[0],
            QueueAlert::DepthExceeded {
                pending: 3,
                threshold: 2
            }
        ));
        assert!(matches!(alerts[1], QueueAlert::StalledLease { .. }));
    }

    #[tokio::test]
    async fn test_collector_reports_alerts_from_store() {
        let mut store = MockQueueStore::new();
        store.expect_backend().return_const(Backend::Memory);
        store.expect_stats().times(1).returning(|_| {
            Ok(QueueStats {
                pending_count: 900,
                max_size: 1000,
                ..QueueStats::default()
            })
        });

        let collector = StatsCollector::new(Arc::new(store), AlertThresholds::default());
        let (stats, alerts) = collector.check().await.unwrap();

        assert_eq!(stats.pending_count, 900);
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_collector_propagates_backend_errors() {
        let mut store = MockQueueStore::new();
        store.expect_backend().return_const(Backend::Redis);
        store
            .expect_stats()
            .returning(|_| Err(QueueError::unavailable("connection refused")));

        let collector = StatsCollector::new(Arc::new(store), AlertThresholds::default());
        let err = collector.collect().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
