//! Quote Queue
//!
//! A priority work queue for asynchronous quote processing.
//!
//! ## Features
//!
//! - **Priority ordering**: URGENT > HIGH > NORMAL > LOW, FIFO within a priority
//! - **Two backends**: in-process (`MemoryStore`) and durable Redis (`RedisStore`)
//! - **At-least-once delivery**: leases expire and are reclaimed by the janitor
//! - **Retries**: failed attempts are requeued until `max_retries`, then dead-lettered
//! - **Prometheus metrics**: counters, gauges and a processing-duration histogram
//!
//! ## Example
//!
//! ```ignore
//! use quote_queue::{Dispatcher, DispatcherConfig, MemoryStore, QuoteQueue, QueueStore};
//!
//! let store: Arc<dyn QueueStore> = Arc::new(MemoryStore::new(1000));
//! let queue = QuoteQueue::new(store.clone());
//! let id = queue.enqueue(payload, Priority::High).await?;
//!
//! let dispatcher = Dispatcher::new(store, MyProcessor, DispatcherConfig::new(4));
//! dispatcher.run(shutdown_rx).await?;
//! ```

mod backoff;
mod dispatcher;
mod error;
mod janitor;
mod message;
pub mod metrics;
mod priority;
mod processor;
mod queue;
pub mod settings;
mod stats;
mod store;

// Re-export main types
pub use backoff::{BackoffPolicy, BackoffStrategy, RetryConfig, retry_with_backoff};
pub use dispatcher::{Dispatch, DispatchOutcome, Dispatcher, DispatcherConfig};
pub use error::{ErrorCategory, QueueError};
pub use janitor::{Janitor, JanitorConfig, SweepReport};
pub use message::{
    CancelOutcome, EnqueueOptions, Message, MessageId, MessageStatus, Payload, Priority, Resolution,
};
pub use metrics::{QueueMetrics, init_metrics, render_metrics};
pub use priority::{CoverageThresholdRule, FixedPriority, PriorityRule};
pub use processor::QuoteProcessor;
pub use queue::{HealthReport, MessageStatusView, QuoteQueue};
pub use settings::{ConfigError, Environment, FromEnv, QueueSettings};
pub use stats::{AlertThresholds, QueueAlert, QueueCounters, QueueStats, StatsCollector};
pub use store::{Backend, MemoryStore, QueueStore, RedisKeys, RedisStore, RedisStoreConfig};
