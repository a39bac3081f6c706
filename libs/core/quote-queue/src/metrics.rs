//! Prometheus metrics for the quote queue
//!
//! Provides observability into queue depth and dispatcher throughput.

use crate::error::QueueError;
use crate::message::Priority;
use crate::stats::QueueStats;
use crate::store::Backend;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() -> Result<&'static PrometheusHandle, QueueError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            QueueError::Config(format!("Failed to install Prometheus recorder: {e}"))
        })?;
        info!("Prometheus metrics initialized");
        Ok(handle)
    })
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Queue metrics helper, labelled by backend
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    backend: &'static str,
}

impl QueueMetrics {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend: backend.as_str(),
        }
    }

    pub fn message_enqueued(&self, priority: Priority) {
        counter!(
            "quote_queue_messages_enqueued_total",
            "backend" => self.backend,
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    pub fn message_rejected(&self) {
        counter!(
            "quote_queue_messages_rejected_total",
            "backend" => self.backend
        )
        .increment(1);
    }

    pub fn message_leased(&self, priority: Priority) {
        counter!(
            "quote_queue_messages_leased_total",
            "backend" => self.backend,
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    /// Record a processor attempt and how long it took
    pub fn attempt_finished(&self, processor: &'static str, outcome: &'static str, duration: Duration) {
        counter!(
            "quote_queue_attempts_total",
            "backend" => self.backend,
            "processor" => processor,
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            "quote_queue_processing_duration_seconds",
            "backend" => self.backend,
            "processor" => processor
        )
        .record(duration.as_secs_f64());
    }

    pub fn message_completed(&self) {
        counter!(
            "quote_queue_messages_completed_total",
            "backend" => self.backend
        )
        .increment(1);
    }

    pub fn message_retried(&self) {
        counter!(
            "quote_queue_messages_retried_total",
            "backend" => self.backend
        )
        .increment(1);
    }

    pub fn message_dead_lettered(&self) {
        counter!(
            "quote_queue_messages_dead_lettered_total",
            "backend" => self.backend
        )
        .increment(1);
    }

    pub fn message_cancelled(&self) {
        counter!(
            "quote_queue_messages_cancelled_total",
            "backend" => self.backend
        )
        .increment(1);
    }

    pub fn leases_reclaimed(&self, count: usize) {
        counter!(
            "quote_queue_leases_reclaimed_total",
            "backend" => self.backend
        )
        .increment(count as u64);
    }

    pub fn messages_purged(&self, count: usize) {
        counter!(
            "quote_queue_messages_purged_total",
            "backend" => self.backend
        )
        .increment(count as u64);
    }

    pub fn backend_error(&self, operation: &'static str) {
        counter!(
            "quote_queue_backend_errors_total",
            "backend" => self.backend,
            "operation" => operation
        )
        .increment(1);
    }

    /// Update the depth and age gauges from a stats snapshot
    pub fn record_stats(&self, stats: &QueueStats) {
        gauge!("quote_queue_pending", "backend" => self.backend).set(stats.pending_count as f64);
        gauge!("quote_queue_processing", "backend" => self.backend)
            .set(stats.processing_count as f64);
        gauge!("quote_queue_completed", "backend" => self.backend)
            .set(stats.completed_count as f64);
        gauge!("quote_queue_failed", "backend" => self.backend).set(stats.failed_count as f64);
        gauge!("quote_queue_cancelled", "backend" => self.backend)
            .set(stats.cancelled_count as f64);
        gauge!("quote_queue_utilization_ratio", "backend" => self.backend)
            .set(stats.utilization());
        gauge!("quote_queue_oldest_pending_age_seconds", "backend" => self.backend)
            .set(stats.oldest_pending_age_secs.unwrap_or(0.0));
        gauge!("quote_queue_longest_processing_age_seconds", "backend" => self.backend)
            .set(stats.longest_processing_age_secs.unwrap_or(0.0));
    }
}
