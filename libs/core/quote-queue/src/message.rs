//! Queue message model and its lifecycle transitions.
//!
//! Every status change goes through a method on [`Message`] so that both
//! backends apply the same state machine. Backends only decide *where* a
//! message lives; the message decides *whether* a transition is legal.

use crate::error::QueueError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Opaque quote payload. The queue never inspects or mutates it.
pub type Payload = serde_json::Map<String, Value>;

/// Unique message identifier (UUID v7, time ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Message priority. Higher priorities are leased first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low = 1,
    /// Default priority
    #[default]
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Priority {
    /// Numeric weight (1..=4)
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Priority::Low),
            2 => Some(Priority::Normal),
            3 => Some(Priority::High),
            4 => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// Message lifecycle status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting to be leased
    Pending,
    /// Leased by a dispatcher worker
    Processing,
    Completed,
    /// Retries exhausted
    Failed,
    Cancelled,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::Completed | MessageStatus::Failed | MessageStatus::Cancelled
        )
    }
}

/// Per-message delivery options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    pub priority: Priority,
    /// Number of attempts before the message is dead-lettered
    pub max_retries: u32,
    /// Lease duration
    pub timeout_seconds: u64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            max_retries: 3,
            timeout_seconds: 300,
        }
    }
}

impl EnqueueOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// How an attempt (or a lease expiry) was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Resolution {
    /// Processor succeeded, message is COMPLETED
    Completed,
    /// Attempt failed and retries remain, message is PENDING again
    Requeued,
    /// Attempt failed and retries are exhausted, message is FAILED
    DeadLettered,
    /// A cancel was recorded during the attempt, message is CANCELLED
    Cancelled,
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CancelOutcome {
    /// PENDING message moved straight to CANCELLED
    Cancelled,
    /// Message is PROCESSING; it becomes CANCELLED when the attempt resolves
    Deferred,
    AlreadyCancelled,
}

/// A queued quote together with its lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub payload: Payload,
    pub priority: Priority,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub error_message: Option<String>,
    /// Processor output, kept apart from the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Message {
    pub fn new(payload: Payload, options: EnqueueOptions, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            payload,
            priority: options.priority,
            status: MessageStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: options.max_retries,
            timeout_seconds: options.timeout_seconds,
            error_message: None,
            result: None,
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Instant at which the current lease runs out
    pub fn lease_deadline(&self) -> Option<DateTime<Utc>> {
        let timeout = Duration::try_seconds(i64::try_from(self.timeout_seconds).ok()?)?;
        self.started_at
            .and_then(|started| started.checked_add_signed(timeout))
    }

    /// True when the message is PROCESSING and its lease ran out strictly before `now`
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == MessageStatus::Processing
            && self.lease_deadline().is_some_and(|deadline| deadline < now)
    }

    /// Time spent in the current status, measured from the relevant stamp
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let since = match self.status {
            MessageStatus::Processing => self.started_at.unwrap_or(self.created_at),
            _ => self.created_at,
        };
        (now - since).max(Duration::zero())
    }

    /// PENDING -> PROCESSING
    pub(crate) fn begin_lease(&mut self, now: DateTime<Utc>) -> Result<(), QueueError> {
        self.expect_status(MessageStatus::Processing, MessageStatus::Pending)?;
        self.status = MessageStatus::Processing;
        self.started_at = Some(self.stamp(now));
        Ok(())
    }

    /// PROCESSING -> COMPLETED (or CANCELLED when a cancel was recorded)
    pub(crate) fn complete(
        &mut self,
        now: DateTime<Utc>,
        result: Value,
    ) -> Result<Resolution, QueueError> {
        self.expect_status(MessageStatus::Completed, MessageStatus::Processing)?;
        if self.cancel_requested {
            self.finish(MessageStatus::Cancelled, now);
            self.result = Some(result);
            return Ok(Resolution::Cancelled);
        }

        self.finish(MessageStatus::Completed, now);
        self.result = Some(result);
        self.error_message = None;
        Ok(Resolution::Completed)
    }

    /// PROCESSING -> PENDING while retries remain, otherwise FAILED
    pub(crate) fn fail(&mut self, now: DateTime<Utc>, error: &str) -> Result<Resolution, QueueError> {
        self.expect_status(MessageStatus::Failed, MessageStatus::Processing)?;
        self.error_message = Some(error.to_string());

        if self.cancel_requested {
            self.finish(MessageStatus::Cancelled, now);
            return Ok(Resolution::Cancelled);
        }

        let attempts = self.retry_count.saturating_add(1);
        if attempts < self.max_retries {
            self.retry_count = attempts;
            self.status = MessageStatus::Pending;
            self.started_at = None;
            Ok(Resolution::Requeued)
        } else {
            self.retry_count = self.max_retries;
            self.finish(MessageStatus::Failed, now);
            Ok(Resolution::DeadLettered)
        }
    }

    /// Cancel a PENDING message or flag a PROCESSING one
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Result<CancelOutcome, QueueError> {
        match self.status {
            MessageStatus::Pending => {
                self.finish(MessageStatus::Cancelled, now);
                Ok(CancelOutcome::Cancelled)
            }
            MessageStatus::Processing => {
                self.cancel_requested = true;
                Ok(CancelOutcome::Deferred)
            }
            MessageStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
            status => Err(QueueError::invalid_state(
                self.id,
                format!("cannot cancel a {status} message"),
            )),
        }
    }

    fn finish(&mut self, status: MessageStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(self.stamp(now));
    }

    // Keeps created_at <= started_at <= completed_at even when clocks disagree
    fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.started_at.unwrap_or(self.created_at);
        now.max(floor)
    }

    fn expect_status(&self, target: MessageStatus, required: MessageStatus) -> Result<(), QueueError> {
        if self.status == required {
            Ok(())
        } else {
            Err(QueueError::invalid_state(
                self.id,
                format!("cannot move a {} message to {target}", self.status),
            ))
        }
    }
}
