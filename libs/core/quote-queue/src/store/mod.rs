//! Storage backends.
//!
//! Both backends implement [`QueueStore`] and share the message state machine
//! in [`crate::message`]. The backend is chosen once at startup.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{RedisKeys, RedisStore, RedisStoreConfig};

use crate::error::QueueError;
use crate::message::{CancelOutcome, EnqueueOptions, Message, MessageId, Payload, Resolution};
use crate::stats::QueueStats;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// Which storage implementation backs a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// Volatile, single process
    Memory,
    /// Durable, shared by every worker pointed at the same prefix
    Redis,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Redis => "redis",
        }
    }
}

/// Storage contract shared by the in-process and Redis backends.
///
/// Every transition is atomic with respect to other callers: a message is
/// leased by at most one caller, and a racing `complete`/`fail`/reclaim on the
/// same lease resolves exactly once (the loser gets `InvalidState`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Add a PENDING message. Fails with `Capacity` when the pending set is full.
    async fn enqueue(
        &self,
        payload: Payload,
        options: EnqueueOptions,
    ) -> Result<MessageId, QueueError>;

    /// Lease the highest priority PENDING message (FIFO within a priority)
    async fn lease_next(&self) -> Result<Option<Message>, QueueError>;

    /// PROCESSING -> COMPLETED
    async fn complete(&self, id: MessageId, result: Value) -> Result<Resolution, QueueError>;

    /// PROCESSING -> PENDING (retries remain) or FAILED
    async fn fail(&self, id: MessageId, error: &str) -> Result<Resolution, QueueError>;

    async fn cancel(&self, id: MessageId) -> Result<CancelOutcome, QueueError>;

    /// Fail every lease that expired before `now`; returns how many were resolved
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<usize, QueueError>;

    async fn get(&self, id: MessageId) -> Result<Option<Message>, QueueError>;

    async fn stats(&self, now: DateTime<Utc>) -> Result<QueueStats, QueueError>;

    /// Drop terminal messages that finished before `older_than`
    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Error text recorded when the janitor reclaims a lease
pub(crate) fn lease_expired_error(message: &Message) -> String {
    format!("lease expired after {}s", message.timeout_seconds)
}
