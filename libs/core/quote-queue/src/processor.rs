//! The processing collaborator invoked once per leased message.

use crate::error::QueueError;
use crate::message::Payload;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Trait for quote processors.
///
/// The underwriting/rating step lives outside the queue; the dispatcher only
/// needs something that turns a payload into a result.
///
/// # Example
///
/// ```rust,ignore
/// use quote_queue::{Payload, QueueError, QuoteProcessor};
///
/// struct RatingProcessor {
///     engine: Arc<dyn RatingEngine>,
/// }
///
/// #[async_trait]
/// impl QuoteProcessor for RatingProcessor {
///     async fn process(&self, payload: &Payload) -> Result<Value, QueueError> {
///         let premium = self.engine.rate(payload).await.map_err(QueueError::processor)?;
///         Ok(json!({ "premium": premium }))
///     }
///
///     fn name(&self) -> &'static str {
///         "RatingProcessor"
///     }
/// }
/// ```
#[async_trait]
pub trait QuoteProcessor: Send + Sync {
    /// Process a single quote.
    ///
    /// Return the result to store on the message, or an error to count the
    /// attempt as failed. The dispatcher enforces the message's deadline.
    async fn process(&self, payload: &Payload) -> Result<Value, QueueError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<P> QuoteProcessor for Arc<P>
where
    P: QuoteProcessor + ?Sized,
{
    async fn process(&self, payload: &Payload) -> Result<Value, QueueError> {
        (**self).process(payload).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
