//! Backoff policies for the dispatcher idle wait and for connection retries.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How the delay grows with the attempt number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Always `base`
    Fixed,
    /// `base * (attempt + 1)`
    Linear,
    /// `base * 2^attempt`
    Exponential,
}

/// Delay policy, capped at `max`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub base: Duration,
    pub max: Duration,
    /// Scale each delay to 50-100% of its value to spread out pollers
    pub use_jitter: bool,
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base: delay,
            max: delay,
            use_jitter: false,
        }
    }

    pub fn linear(base: Duration, max: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            base,
            max,
            use_jitter: false,
        }
    }

    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base,
            max,
            use_jitter: false,
        }
    }

    pub fn with_jitter(mut self) -> Self {
        self.use_jitter = true;
        self
    }

    /// Delay before retry number `attempt` (zero based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = match self.strategy {
            BackoffStrategy::Fixed => 1,
            BackoffStrategy::Linear => attempt.saturating_add(1),
            BackoffStrategy::Exponential => 2u32.saturating_pow(attempt),
        };
        let delay = self.base.saturating_mul(factor).min(self.max);

        if self.use_jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(500), Duration::from_secs(5))
    }
}

/// Retry configuration for backend connections
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl RetryConfig {
    /// Defaults: 3 retries, exponential 100ms..5s with jitter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(5))
                .with_jitter(),
        }
    }
}

/// Retry an async operation until it succeeds or the retries run out
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new().with_max_retries(5);
/// let conn = retry_with_backoff(|| async { connect(&url).await }, &config).await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(mut operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retries", attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_retries {
                    warn!("Operation failed after {} attempts: {}", attempt + 1, e);
                    return Err(e);
                }

                let delay = config.backoff.delay(attempt);
                attempt += 1;
                debug!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt, config.max_retries, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let random_factor =
        (RandomState::new().hash_one(std::time::SystemTime::now()) % 50) as f64 / 100.0 + 0.5;
    delay.mul_f64(random_factor)
}
