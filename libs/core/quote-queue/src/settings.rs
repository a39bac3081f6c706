//! Environment-driven configuration.

use crate::backoff::BackoffPolicy;
use crate::dispatcher::DispatcherConfig;
use crate::janitor::JanitorConfig;
use crate::message::EnqueueOptions;
use crate::priority::CoverageThresholdRule;
use crate::stats::AlertThresholds;
use crate::store::{Backend, RedisStoreConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env_or_default("APP_ENV", "development");

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Helper to load an environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Helper to load an environment variable or return error
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Helper to load and parse an environment variable with a default value
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Reject a zero interval for `key`
pub fn non_zero(key: &str, interval: Duration) -> Result<Duration, ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::ParseError {
            key: key.to_string(),
            details: "must be greater than zero".to_string(),
        });
    }
    Ok(interval)
}

/// Queue settings, one field per `QUEUE_*` variable
#[derive(Clone, Debug)]
pub struct QueueSettings {
    pub environment: Environment,
    pub backend: Backend,
    /// Required when `backend` is Redis (`REDIS_URL`, falling back to `REDIS_HOST`)
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub max_size: usize,
    pub workers: usize,
    pub poll_interval: Duration,
    pub max_idle: Duration,
    pub janitor_interval: Duration,
    pub retention: Duration,
    pub default_max_retries: u32,
    pub default_timeout_secs: u64,
    pub coverage_field: String,
    pub coverage_high: f64,
    pub coverage_low: f64,
    pub alert_max_pending: usize,
    pub alert_stalled: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            backend: Backend::Memory,
            redis_url: None,
            key_prefix: "quote_processing".to_string(),
            max_size: 1000,
            workers: 4,
            poll_interval: Duration::from_millis(500),
            max_idle: Duration::from_millis(5000),
            janitor_interval: Duration::from_secs(30),
            retention: Duration::from_secs(24 * 60 * 60),
            default_max_retries: 3,
            default_timeout_secs: 300,
            coverage_field: CoverageThresholdRule::DEFAULT_POINTER.to_string(),
            coverage_high: CoverageThresholdRule::DEFAULT_HIGH,
            coverage_low: CoverageThresholdRule::DEFAULT_LOW,
            alert_max_pending: 800,
            alert_stalled: Duration::from_secs(600),
        }
    }
}

impl FromEnv for QueueSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend_raw = env_or_default("QUEUE_BACKEND", defaults.backend.as_str());
        let backend = backend_raw
            .trim()
            .to_ascii_lowercase()
            .parse::<Backend>()
            .map_err(|_| ConfigError::ParseError {
                key: "QUEUE_BACKEND".to_string(),
                details: format!("unknown backend '{backend_raw}', expected memory or redis"),
            })?;

        let redis_url = env::var("REDIS_URL").or_else(|_| env::var("REDIS_HOST")).ok();
        if backend == Backend::Redis && redis_url.is_none() {
            return Err(ConfigError::MissingEnvVar("REDIS_URL".to_string()));
        }

        let retention_hours = env_parse("QUEUE_RETENTION_HOURS", 24u64)?;

        Ok(Self {
            environment: Environment::from_env(),
            backend,
            redis_url,
            key_prefix: env_or_default("QUEUE_KEY_PREFIX", &defaults.key_prefix),
            max_size: env_parse("QUEUE_MAX_SIZE", defaults.max_size)?,
            workers: env_parse("QUEUE_WORKERS", defaults.workers)?,
            poll_interval: Duration::from_millis(env_parse("QUEUE_POLL_INTERVAL_MS", 500u64)?),
            max_idle: Duration::from_millis(env_parse("QUEUE_MAX_IDLE_MS", 5000u64)?),
            janitor_interval: non_zero(
                "QUEUE_JANITOR_INTERVAL_SECS",
                Duration::from_secs(env_parse("QUEUE_JANITOR_INTERVAL_SECS", 30u64)?),
            )?,
            retention: Duration::from_secs(retention_hours.checked_mul(60 * 60).ok_or_else(
                || ConfigError::ParseError {
                    key: "QUEUE_RETENTION_HOURS".to_string(),
                    details: format!("{retention_hours} hours is out of range"),
                },
            )?),
            default_max_retries: env_parse(
                "QUEUE_DEFAULT_MAX_RETRIES",
                defaults.default_max_retries,
            )?,
            default_timeout_secs: env_parse(
                "QUEUE_DEFAULT_TIMEOUT_SECS",
                defaults.default_timeout_secs,
            )?,
            coverage_field: env_or_default("QUEUE_COVERAGE_FIELD", &defaults.coverage_field),
            coverage_high: env_parse("QUEUE_COVERAGE_HIGH", defaults.coverage_high)?,
            coverage_low: env_parse("QUEUE_COVERAGE_LOW", defaults.coverage_low)?,
            alert_max_pending: env_parse("QUEUE_ALERT_MAX_PENDING", defaults.alert_max_pending)?,
            alert_stalled: Duration::from_secs(env_parse("QUEUE_ALERT_STALLED_SECS", 600u64)?),
        })
    }
}

impl QueueSettings {
    pub fn enqueue_defaults(&self) -> EnqueueOptions {
        EnqueueOptions::default()
            .with_max_retries(self.default_max_retries)
            .with_timeout_seconds(self.default_timeout_secs)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::new(self.workers).with_idle_backoff(
            BackoffPolicy::exponential(self.poll_interval, self.max_idle.max(self.poll_interval))
                .with_jitter(),
        )
    }

    pub fn janitor_config(&self) -> JanitorConfig {
        JanitorConfig::default()
            .with_interval(self.janitor_interval)
            .with_retention(self.retention)
    }

    pub fn redis_store_config(&self) -> RedisStoreConfig {
        RedisStoreConfig::new(self.key_prefix.clone())
            .with_max_size(self.max_size)
            .with_retention(self.retention)
    }

    pub fn priority_rule(&self) -> CoverageThresholdRule {
        CoverageThresholdRule::new(
            self.coverage_field.clone(),
            self.coverage_high,
            self.coverage_low,
        )
    }

    pub fn alert_thresholds(&self) -> AlertThresholds {
        AlertThresholds::default()
            .with_max_pending(self.alert_max_pending)
            .with_stalled_after(self.alert_stalled)
    }
}
