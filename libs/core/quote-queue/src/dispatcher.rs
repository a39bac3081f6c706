//! Dispatcher: leases messages and runs them through a processor.
//!
//! Each worker loops on `lease_next`. A leased message is processed under a
//! deadline of its `timeout_seconds`; success completes it, an error or an
//! elapsed deadline fails it (which requeues or dead-letters). An empty queue
//! backs off according to the idle policy, backend errors back off
//! exponentially. Shutdown is observed between attempts, never during one.

use crate::backoff::BackoffPolicy;
use crate::error::QueueError;
use crate::message::{MessageId, Resolution};
use crate::metrics::QueueMetrics;
use crate::processor::QuoteProcessor;
use crate::store::QueueStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Wait between polls of an empty queue
    pub idle_backoff: BackoffPolicy,
    /// Maximum wait after consecutive backend errors
    pub max_error_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            idle_backoff: BackoffPolicy::exponential(
                Duration::from_millis(500),
                Duration::from_secs(5),
            ),
            max_error_backoff: Duration::from_secs(30),
        }
    }
}

impl DispatcherConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_idle_backoff(mut self, idle_backoff: BackoffPolicy) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    pub fn with_max_error_backoff(mut self, max_error_backoff: Duration) -> Self {
        self.max_error_backoff = max_error_backoff;
        self
    }
}

/// What happened to a leased message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The attempt was recorded
    Resolved(Resolution),
    /// The lease was resolved by someone else first (reclaimed after expiry)
    Superseded,
}

/// One dispatched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub message_id: MessageId,
    pub outcome: DispatchOutcome,
}

/// Runs processor workers against a queue store.
pub struct Dispatcher<P>
where
    P: QuoteProcessor,
{
    store: Arc<dyn QueueStore>,
    processor: Arc<P>,
    config: DispatcherConfig,
    metrics: QueueMetrics,
}

impl<P> Clone for Dispatcher<P>
where
    P: QuoteProcessor,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            processor: self.processor.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P> Dispatcher<P>
where
    P: QuoteProcessor + 'static,
{
    pub fn new(store: Arc<dyn QueueStore>, processor: P, config: DispatcherConfig) -> Self {
        Self::with_arc_processor(store, Arc::new(processor), config)
    }

    pub fn with_arc_processor(
        store: Arc<dyn QueueStore>,
        processor: Arc<P>,
        config: DispatcherConfig,
    ) -> Self {
        let metrics = QueueMetrics::new(store.backend());
        Self {
            store,
            processor,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run all workers until shutdown is signalled.
    ///
    /// In-flight attempts finish before their worker exits.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        let workers = self.config.workers.max(1);
        info!(
            backend = %self.store.backend(),
            processor = %self.processor.name(),
            workers,
            "Starting dispatcher"
        );

        let mut join_set = JoinSet::new();
        for worker_id in 0..workers {
            let dispatcher = self.clone();
            let shutdown = shutdown.clone();
            join_set.spawn(async move { dispatcher.worker_loop(worker_id, shutdown).await });
        }

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Dispatcher worker panicked");
            }
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id, "Dispatcher worker started");

        let mut idle_polls: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.dispatch_once().await {
                Ok(Some(_)) => {
                    idle_polls = 0;
                    if consecutive_errors > 0 {
                        info!(worker_id, "Backend recovered after {} errors", consecutive_errors);
                        consecutive_errors = 0;
                    }
                    continue;
                }
                Ok(None) => {
                    let delay = self.config.idle_backoff.delay(idle_polls);
                    idle_polls = idle_polls.saturating_add(1);
                    delay
                }
                Err(e) => {
                    let delay = Duration::from_millis(e.backoff_delay_ms(consecutive_errors))
                        .min(self.config.max_error_backoff)
                        .max(self.config.idle_backoff.base);
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    if e.is_unavailable() {
                        warn!(
                            worker_id,
                            error = %e,
                            consecutive_errors,
                            backoff_ms = delay.as_millis() as u64,
                            "Queue backend unavailable, backing off"
                        );
                    } else {
                        error!(worker_id, error = %e, "Dispatcher iteration failed");
                    }
                    delay
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(worker_id, "Dispatcher worker stopped");
    }

    /// Lease and process at most one message.
    ///
    /// Returns `Ok(None)` when the queue is empty. Backend errors while
    /// leasing or resolving are returned; the message then stays leased until
    /// its lease expires and the janitor reclaims it.
    pub async fn dispatch_once(&self) -> Result<Option<Dispatch>, QueueError> {
        let message = match self.store.lease_next().await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.metrics.backend_error("lease");
                return Err(e);
            }
        };
        self.metrics.message_leased(message.priority);

        let message_id = message.id;
        let deadline = Duration::from_secs(message.timeout_seconds);
        let started = Instant::now();

        let attempt =
            tokio::time::timeout(deadline, self.processor.process(&message.payload)).await;
        let elapsed = started.elapsed();

        let resolved = match attempt {
            Ok(Ok(result)) => {
                self.metrics
                    .attempt_finished(self.processor.name(), "success", elapsed);
                self.store.complete(message_id, result).await
            }
            Ok(Err(e)) => {
                self.metrics
                    .attempt_finished(self.processor.name(), "error", elapsed);
                warn!(
                    message_id = %message_id,
                    retry_count = message.retry_count,
                    error = %e,
                    "Quote processing failed"
                );
                self.store.fail(message_id, &e.to_string()).await
            }
            Err(_) => {
                self.metrics
                    .attempt_finished(self.processor.name(), "timeout", elapsed);
                warn!(
                    message_id = %message_id,
                    timeout_seconds = message.timeout_seconds,
                    "Quote processing timed out"
                );
                self.store
                    .fail(
                        message_id,
                        &format!("processing timed out after {}s", message.timeout_seconds),
                    )
                    .await
            }
        };

        let outcome = match resolved {
            Ok(resolution) => {
                self.record_resolution(message_id, resolution);
                DispatchOutcome::Resolved(resolution)
            }
            Err(e) if e.is_invalid_state() => {
                warn!(message_id = %message_id, error = %e, "Attempt result discarded");
                DispatchOutcome::Superseded
            }
            Err(e) => {
                self.metrics.backend_error("resolve");
                return Err(e);
            }
        };

        Ok(Some(Dispatch {
            message_id,
            outcome,
        }))
    }

    fn record_resolution(&self, message_id: MessageId, resolution: Resolution) {
        match resolution {
            Resolution::Completed => {
                self.metrics.message_completed();
                info!(message_id = %message_id, "Quote processed");
            }
            Resolution::Requeued => {
                self.metrics.message_retried();
                debug!(message_id = %message_id, "Quote requeued for retry");
            }
            Resolution::DeadLettered => {
                self.metrics.message_dead_lettered();
                error!(message_id = %message_id, "Quote failed, retries exhausted");
            }
            Resolution::Cancelled => {
                self.metrics.message_cancelled();
                info!(message_id = %message_id, "Quote cancelled");
            }
        }
    }
}
