//! Queue error types and error categorization
//!
//! Errors are categorized to decide who has to react to them:
//! - **Rejected**: the caller asked for something the queue cannot accept right now
//! - **Conflict**: the message is not in a state that allows the transition
//! - **Processing**: the processor failed, absorbed into message state
//! - **Transient**: the backend is unreachable, back off and try again
//! - **Permanent**: corrupt data, bad configuration or a command the backend
//!   refuses, retrying will not help

use crate::message::MessageId;
use thiserror::Error;

/// Category of error for determining the reaction of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Capacity reached - surface to the producer
    Rejected,
    /// Invalid state transition - surface to the caller, never retried
    Conflict,
    /// Processor failure - counted against the message's retries
    Processing,
    /// Backend unavailable - back off the dispatcher loop
    Transient,
    /// Serialization or configuration problem
    Permanent,
}

impl ErrorCategory {
    /// Base delay in milliseconds before the dispatcher polls again
    pub fn base_delay_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 1000,
            ErrorCategory::Permanent => 5000,
            _ => 0,
        }
    }

    /// Maximum delay in milliseconds before the dispatcher polls again
    pub fn max_delay_ms(&self) -> u64 {
        match self {
            ErrorCategory::Transient => 30_000,
            ErrorCategory::Permanent => 60_000,
            _ => 0,
        }
    }

    /// Exponential backoff delay for the given number of consecutive errors
    pub fn backoff_delay_ms(&self, consecutive_errors: u32) -> u64 {
        let delay = self
            .base_delay_ms()
            .saturating_mul(2u64.saturating_pow(consecutive_errors));
        delay.min(self.max_delay_ms())
    }
}

/// Queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// The pending set has reached the configured maximum size
    #[error("Queue is full (max size: {max_size})")]
    Capacity { max_size: usize },

    /// The requested transition is not valid for the message's current state
    #[error("Invalid state for message {id}: {reason}")]
    InvalidState { id: MessageId, reason: String },

    /// The processor returned an error or exceeded its deadline
    #[error("Processor failed: {0}")]
    ProcessorFailure(String),

    /// The durable backend could not be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend answered but refused the command
    #[error("Backend rejected command: {0}")]
    BackendRejected(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Create an invalid state error
    pub fn invalid_state(id: MessageId, reason: impl Into<String>) -> Self {
        QueueError::InvalidState {
            id,
            reason: reason.into(),
        }
    }

    /// Create a processor failure
    pub fn processor(message: impl Into<String>) -> Self {
        QueueError::ProcessorFailure(message.into())
    }

    /// Create a backend unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        QueueError::BackendUnavailable(message.into())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::Capacity { .. } => ErrorCategory::Rejected,
            QueueError::InvalidState { .. } => ErrorCategory::Conflict,
            QueueError::ProcessorFailure(_) => ErrorCategory::Processing,
            QueueError::BackendUnavailable(_) => ErrorCategory::Transient,
            QueueError::BackendRejected(_) => ErrorCategory::Permanent,
            QueueError::Serialization(_) => ErrorCategory::Permanent,
            QueueError::Config(_) => ErrorCategory::Permanent,
        }
    }

    /// Check if this is a backend connection problem
    pub fn is_unavailable(&self) -> bool {
        matches!(self, QueueError::BackendUnavailable(_))
    }

    /// Check if this is an invalid state transition
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, QueueError::InvalidState { .. })
    }

    /// Get the backoff delay for the dispatcher loop
    pub fn backoff_delay_ms(&self, consecutive_errors: u32) -> u64 {
        self.category().backoff_delay_ms(consecutive_errors)
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
            || err.is_cluster_error()
        {
            QueueError::BackendUnavailable(err.to_string())
        } else {
            QueueError::BackendRejected(err.to_string())
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}
