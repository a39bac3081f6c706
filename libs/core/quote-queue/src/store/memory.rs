//! In-process backend.
//!
//! All state sits behind one `RwLock`, so every operation is a single
//! critical section and leases are trivially exclusive. Nothing survives a
//! restart.

use super::{Backend, QueueStore, lease_expired_error};
use crate::error::QueueError;
use crate::message::{
    CancelOutcome, EnqueueOptions, Message, MessageId, MessageStatus, Payload, Priority, Resolution,
};
use crate::stats::{QueueCounters, QueueStats, StatsAccumulator};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Position of a PENDING message: priority desc, then creation, then insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    priority: Reverse<Priority>,
    created_at: DateTime<Utc>,
    sequence: u64,
}

/// A PROCESSING message remembers its slot so a retry goes back to it
#[derive(Debug)]
struct Lease {
    key: PendingKey,
    message: Message,
}

#[derive(Debug, Default)]
struct MemoryState {
    pending: BTreeMap<PendingKey, Message>,
    pending_index: HashMap<MessageId, PendingKey>,
    processing: HashMap<MessageId, Lease>,
    terminal: HashMap<MessageId, Message>,
    counters: QueueCounters,
    next_sequence: u64,
}

impl MemoryState {
    fn find(&self, id: &MessageId) -> Option<&Message> {
        if let Some(key) = self.pending_index.get(id) {
            return self.pending.get(key);
        }
        self.processing
            .get(id)
            .map(|lease| &lease.message)
            .or_else(|| self.terminal.get(id))
    }

    fn not_processing(&self, id: MessageId) -> QueueError {
        match self.find(&id) {
            Some(message) => QueueError::invalid_state(
                id,
                format!("expected processing, found {}", message.status),
            ),
            None => QueueError::invalid_state(id, "unknown message"),
        }
    }

    fn push_pending(&mut self, key: PendingKey, message: Message) {
        self.pending_index.insert(message.id, key);
        self.pending.insert(key, message);
    }

    /// Apply an attempt outcome to a leased message and file it accordingly
    fn resolve<F>(&mut self, id: MessageId, apply: F) -> Result<Resolution, QueueError>
    where
        F: FnOnce(&mut Message) -> Result<Resolution, QueueError>,
    {
        let Some(lease) = self.processing.get_mut(&id) else {
            return Err(self.not_processing(id));
        };
        let resolution = apply(&mut lease.message)?;

        let Some(Lease { key, message }) = self.processing.remove(&id) else {
            return Err(self.not_processing(id));
        };
        match resolution {
            Resolution::Requeued => {
                self.counters.total_retries += 1;
                self.push_pending(key, message);
            }
            Resolution::Completed => {
                self.counters.total_completed += 1;
                self.terminal.insert(id, message);
            }
            Resolution::DeadLettered => {
                self.counters.total_failed += 1;
                self.terminal.insert(id, message);
            }
            Resolution::Cancelled => {
                self.counters.total_cancelled += 1;
                self.terminal.insert(id, message);
            }
        }
        Ok(resolution)
    }
}

/// Volatile single-node queue store
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    max_size: usize,
}

impl MemoryStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    // Poisoned locks are recovered
    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn enqueue(
        &self,
        payload: Payload,
        options: EnqueueOptions,
    ) -> Result<MessageId, QueueError> {
        let mut state = self.write();
        if state.pending.len() >= self.max_size {
            return Err(QueueError::Capacity {
                max_size: self.max_size,
            });
        }

        let message = Message::new(payload, options, Utc::now());
        let id = message.id;
        let key = PendingKey {
            priority: Reverse(message.priority),
            created_at: message.created_at,
            sequence: state.next_sequence,
        };
        state.next_sequence += 1;
        state.counters.total_enqueued += 1;
        state.push_pending(key, message);

        info!(message_id = %id, priority = %options.priority, "Message enqueued");
        Ok(id)
    }

    async fn lease_next(&self) -> Result<Option<Message>, QueueError> {
        let mut state = self.write();
        let Some((key, mut message)) = state.pending.pop_first() else {
            return Ok(None);
        };
        state.pending_index.remove(&message.id);

        message.begin_lease(Utc::now())?;
        state.counters.total_leased += 1;
        state.processing.insert(
            message.id,
            Lease {
                key,
                message: message.clone(),
            },
        );

        debug!(message_id = %message.id, priority = %message.priority, "Message leased");
        Ok(Some(message))
    }

    async fn complete(&self, id: MessageId, result: Value) -> Result<Resolution, QueueError> {
        let now = Utc::now();
        self.write()
            .resolve(id, |message| message.complete(now, result))
    }

    async fn fail(&self, id: MessageId, error: &str) -> Result<Resolution, QueueError> {
        let now = Utc::now();
        self.write().resolve(id, |message| message.fail(now, error))
    }

    async fn cancel(&self, id: MessageId) -> Result<CancelOutcome, QueueError> {
        let now = Utc::now();
        let mut state = self.write();

        if let Some(key) = state.pending_index.remove(&id) {
            let Some(mut message) = state.pending.remove(&key) else {
                return Err(QueueError::invalid_state(id, "unknown message"));
            };
            let outcome = message.cancel(now)?;
            state.counters.total_cancelled += 1;
            state.terminal.insert(id, message);
            info!(message_id = %id, "Pending message cancelled");
            return Ok(outcome);
        }

        if let Some(lease) = state.processing.get_mut(&id) {
            let outcome = lease.message.cancel(now)?;
            info!(message_id = %id, "Cancel recorded for message in flight");
            return Ok(outcome);
        }

        match state.terminal.get_mut(&id) {
            Some(message) => message.cancel(now),
            None => Err(QueueError::invalid_state(id, "unknown message")),
        }
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut state = self.write();
        let expired: Vec<MessageId> = state
            .processing
            .values()
            .filter(|lease| lease.message.lease_expired(now))
            .map(|lease| lease.message.id)
            .collect();

        for id in &expired {
            let resolution = state.resolve(*id, |message| {
                let error = lease_expired_error(message);
                message.fail(now, &error)
            })?;
            state.counters.total_reclaimed += 1;
            info!(message_id = %id, resolution = %resolution, "Expired lease reclaimed");
        }

        Ok(expired.len())
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, QueueError> {
        Ok(self.read().find(&id).cloned())
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<QueueStats, QueueError> {
        let state = self.read();
        let mut acc = StatsAccumulator::new(now, self.max_size);
        state.pending.values().for_each(|m| acc.observe(m));
        state
            .processing
            .values()
            .for_each(|lease| acc.observe(&lease.message));
        state.terminal.values().for_each(|m| acc.observe(m));
        Ok(acc.finish(state.counters))
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut state = self.write();
        let before = state.terminal.len();
        state
            .terminal
            .retain(|_, message| message.completed_at.is_none_or(|at| at >= older_than));
        let purged = before - state.terminal.len();
        state.counters.total_purged += purged as u64;

        if purged > 0 {
            debug!(purged, "Purged terminal messages");
        }
        Ok(purged)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
