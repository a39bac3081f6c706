//! Producer/consumer facade used by the surrounding service.

use crate::error::QueueError;
use crate::message::{
    CancelOutcome, EnqueueOptions, Message, MessageId, MessageStatus, Payload, Priority,
};
use crate::metrics::QueueMetrics;
use crate::priority::{FixedPriority, PriorityRule};
use crate::stats::{AlertThresholds, QueueAlert, QueueStats, StatsCollector};
use crate::store::{Backend, QueueStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Status of a message as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageStatusView {
    pub id: MessageId,
    pub status: MessageStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub cancel_requested: bool,
}

impl From<Message> for MessageStatusView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            status: message.status,
            priority: message.priority,
            created_at: message.created_at,
            started_at: message.started_at,
            completed_at: message.completed_at,
            retry_count: message.retry_count,
            max_retries: message.max_retries,
            error_message: message.error_message,
            payload: message.payload,
            result: message.result,
            cancel_requested: message.cancel_requested,
        }
    }
}

/// Backend health as reported by [`QuoteQueue::health`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub backend: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueueStats>,
}

/// Entry point for producers and status readers.
///
/// # Example
///
/// ```rust,ignore
/// let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::new(1000));
/// let queue = QuoteQueue::new(store).with_priority_rule(CoverageThresholdRule::default());
///
/// let id = queue.submit(payload).await?;
/// let status = queue.get_status(id).await?;
/// ```
#[derive(Clone)]
pub struct QuoteQueue {
    store: Arc<dyn QueueStore>,
    defaults: EnqueueOptions,
    rule: Arc<dyn PriorityRule>,
    collector: StatsCollector,
    metrics: QueueMetrics,
}

impl QuoteQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        let metrics = QueueMetrics::new(store.backend());
        let collector = StatsCollector::new(store.clone(), AlertThresholds::default());
        Self {
            store,
            defaults: EnqueueOptions::default(),
            rule: Arc::new(FixedPriority(Priority::Normal)),
            collector,
            metrics,
        }
    }

    /// Retry and timeout defaults used by `enqueue` and `submit`
    pub fn with_defaults(mut self, defaults: EnqueueOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_priority_rule(mut self, rule: impl PriorityRule + 'static) -> Self {
        self.rule = Arc::new(rule);
        self
    }

    pub fn with_alert_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.collector = StatsCollector::new(self.store.clone(), thresholds);
        self
    }

    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.store.clone()
    }

    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    /// Enqueue with the default retry and timeout settings
    pub async fn enqueue(
        &self,
        payload: Payload,
        priority: Priority,
    ) -> Result<MessageId, QueueError> {
        self.enqueue_with(payload, self.defaults.with_priority(priority))
            .await
    }

    pub async fn enqueue_with(
        &self,
        payload: Payload,
        options: EnqueueOptions,
    ) -> Result<MessageId, QueueError> {
        match self.store.enqueue(payload, options).await {
            Ok(id) => {
                self.metrics.message_enqueued(options.priority);
                Ok(id)
            }
            Err(e) => {
                if matches!(e, QueueError::Capacity { .. }) {
                    self.metrics.message_rejected();
                    warn!(error = %e, "Quote rejected");
                }
                Err(e)
            }
        }
    }

    /// Enqueue with the priority chosen by the configured rule
    pub async fn submit(&self, payload: Payload) -> Result<MessageId, QueueError> {
        let priority = self.rule.priority_for(&payload);
        let id = self.enqueue(payload, priority).await?;
        info!(message_id = %id, priority = %priority, "Quote submitted");
        Ok(id)
    }

    pub async fn get_status(&self, id: MessageId) -> Result<Option<MessageStatusView>, QueueError> {
        Ok(self.store.get(id).await?.map(MessageStatusView::from))
    }

    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        self.collector.collect().await
    }

    /// Current stats together with any crossed alert thresholds
    pub async fn check_alerts(&self) -> Result<(QueueStats, Vec<QueueAlert>), QueueError> {
        self.collector.check().await
    }

    pub async fn cancel(&self, id: MessageId) -> Result<CancelOutcome, QueueError> {
        let outcome = self.store.cancel(id).await?;
        if outcome == CancelOutcome::Cancelled {
            self.metrics.message_cancelled();
        }
        Ok(outcome)
    }

    pub async fn health(&self) -> HealthReport {
        let backend = self.store.backend().as_str();
        match self.store.health_check().await {
            Ok(()) => HealthReport {
                backend,
                healthy: true,
                error: None,
                stats: self.get_stats().await.ok(),
            },
            Err(e) => HealthReport {
                backend,
                healthy: false,
                error: Some(e.to_string()),
                stats: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::CoverageThresholdRule;
    use crate::store::{MemoryStore, MockQueueStore};
    use serde_json::json;

    fn quote(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn memory_queue(max_size: usize) -> QuoteQueue {
        QuoteQueue::new(Arc::new(MemoryStore::new(max_size)))
    }

    #[tokio::test]
    async fn test_submit_applies_priority_rule() {
        let queue = memory_queue(10)
            .with_priority_rule(CoverageThresholdRule::default().with_pointer("/amount"));

        let large = queue.submit(quote(json!({"amount": 600000}))).await.unwrap();
        let typical = queue.submit(quote(json!({"amount": 250000}))).await.unwrap();

        let large = queue.get_status(large).await.unwrap().unwrap();
        let typical = queue.get_status(typical).await.unwrap().unwrap();
        assert_eq!(large.priority, Priority::High);
        assert_eq!(typical.priority, Priority::Normal);
        assert_eq!(large.status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn test_enqueue_uses_defaults() {
        let queue = memory_queue(10).with_defaults(
            EnqueueOptions::default()
                .with_max_retries(5)
                .with_timeout_seconds(60),
        );
        let id = queue
            .enqueue(Payload::new(), Priority::Urgent)
            .await
            .unwrap();

        let message = queue.store().get(id).await.unwrap().unwrap();
        assert_eq!(message.priority, Priority::Urgent);
        assert_eq!(message.max_retries, 5);
        assert_eq!(message.timeout_seconds, 60);
    }

    #[tokio::test]
    async fn test_capacity_reaches_the_caller() {
        let queue = memory_queue(1);
        queue.enqueue(Payload::new(), Priority::Low).await.unwrap();
        let err = queue
            .enqueue(Payload::new(), Priority::Low)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Capacity { max_size: 1 }));
    }

    #[tokio::test]
    async fn test_unknown_status_is_none() {
        let queue = memory_queue(1);
        assert!(queue.get_status(MessageId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_view_serializes() {
        let queue = memory_queue(5);
        let id = queue
            .enqueue(quote(json!({"applicant": "ACME"})), Priority::High)
            .await
            .unwrap();

        let view = queue.get_status(id).await.unwrap().unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["payload"]["applicant"], "ACME");
        assert!(json.get("result").is_none());
    }

    #[tokio::test]
    async fn test_health_reports_stats() {
        let queue = memory_queue(5);
        queue.enqueue(Payload::new(), Priority::Normal).await.unwrap();

        let report = queue.health().await;
        assert!(report.healthy);
        assert_eq!(report.backend, "memory");
        assert_eq!(report.stats.unwrap().pending_count, 1);
    }

    #[tokio::test]
    async fn test_health_reports_backend_failure() {
        let mut store = MockQueueStore::new();
        store.expect_backend().return_const(Backend::Redis);
        store
            .expect_health_check()
            .returning(|| Err(QueueError::unavailable("connection refused")));

        let report = QuoteQueue::new(Arc::new(store)).health().await;
        assert!(!report.healthy);
        assert_eq!(report.backend, "redis");
        assert!(report.error.unwrap().contains("connection refused"));
    }
}
