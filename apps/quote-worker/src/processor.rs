//! Demonstration processor bundled with the worker.
//!
//! Underwriting runs in a separate service; this one acknowledges each quote
//! so the queue can be exercised end to end.

use async_trait::async_trait;
use chrono::Utc;
use quote_queue::{Payload, QueueError, QuoteProcessor};
use serde_json::{Value, json};
use tracing::debug;

/// Acknowledges a quote, echoing the applicant and coverage back in the result
#[derive(Debug, Clone, Default)]
pub struct AcknowledgeProcessor;

#[async_trait]
impl QuoteProcessor for AcknowledgeProcessor {
    async fn process(&self, payload: &Payload) -> Result<Value, QueueError> {
        let coverage = payload
            .get("submission")
            .and_then(|submission| submission.get("coverage_amount"))
            .cloned()
            .unwrap_or(Value::Null);

        debug!(fields = payload.len(), "Acknowledging quote");

        Ok(json!({
            "status": "acknowledged",
            "applicant_id": payload.get("applicant_id").cloned().unwrap_or(Value::Null),
            "coverage_amount": coverage,
            "acknowledged_at": Utc::now(),
        }))
    }

    fn name(&self) -> &'static str {
        "AcknowledgeProcessor"
    }
}
