//! Producer-side priority assignment.

use crate::message::{Payload, Priority};
use serde_json::Value;

/// Decides the priority of a quote before it is enqueued
pub trait PriorityRule: Send + Sync {
    fn priority_for(&self, payload: &Payload) -> Priority;
}

/// Always the same priority
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPriority(pub Priority);

impl PriorityRule for FixedPriority {
    fn priority_for(&self, _payload: &Payload) -> Priority {
        self.0
    }
}

/// Unusually large or unusually small coverage amounts need an underwriter
/// sooner, so they jump the queue.
///
/// The amount is read from a JSON pointer into the payload (for example
/// `/submission/coverage_amount`). Numbers and numeric strings are accepted;
/// anything else gets [`Priority::Normal`].
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageThresholdRule {
    pointer: String,
    high: f64,
    low: f64,
}

impl CoverageThresholdRule {
    pub const DEFAULT_POINTER: &'static str = "/submission/coverage_amount";
    pub const DEFAULT_HIGH: f64 = 500_000.0;
    pub const DEFAULT_LOW: f64 = 100_000.0;

    pub fn new(pointer: impl Into<String>, high: f64, low: f64) -> Self {
        Self {
            pointer: pointer.into(),
            high,
            low,
        }
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = pointer.into();
        self
    }

    pub fn with_thresholds(mut self, high: f64, low: f64) -> Self {
        self.high = high;
        self.low = low;
        self
    }

    pub fn coverage(&self, payload: &Payload) -> Option<f64> {
        match lookup(payload, &self.pointer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl Default for CoverageThresholdRule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POINTER, Self::DEFAULT_HIGH, Self::DEFAULT_LOW)
    }
}

impl PriorityRule for CoverageThresholdRule {
    fn priority_for(&self, payload: &Payload) -> Priority {
        match self.coverage(payload) {
            Some(amount) if amount > self.high || amount < self.low => Priority::High,
            _ => Priority::Normal,
        }
    }
}

fn lookup<'a>(payload: &'a Payload, pointer: &str) -> Option<&'a Value> {
    let path = pointer.strip_prefix('/').unwrap_or(pointer);
    let (first, rest) = match path.split_once('/') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    };
    let root = payload.get(&first.replace("~1", "/").replace("~0", "~"))?;
    match rest {
        Some(rest) => root.pointer(&format!("/{rest}")),
        None => Some(root),
    }
}
