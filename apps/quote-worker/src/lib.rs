//! Quote Worker Service
//!
//! Background worker that drains the quote processing queue.
//!
//! ## Architecture
//!
//! ```text
//! Producers (QuoteQueue::submit)
//!   ↓
//! QueueStore (memory or Redis, selected by QUEUE_BACKEND)
//!   ↓ (lease by priority, FIFO within a tier)
//! Dispatcher<AcknowledgeProcessor> × QUEUE_WORKERS
//!   ↓
//! complete / retry / dead-letter
//!
//! Janitor: reclaims expired leases, purges terminal messages
//! Stats reporter: logs a snapshot and raises threshold alerts
//! ```
//!
//! ## Features
//!
//! - Priority leasing with per-message timeouts
//! - Retries with dead-lettering after `max_retries`
//! - Lease recovery for crashed or hung workers
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Health, stats and Prometheus endpoints for Kubernetes probes

pub mod health;
pub mod processor;
pub mod telemetry;

use eyre::{Result, WrapErr};
use quote_queue::settings::{env_parse, non_zero};
use quote_queue::{
    Backend, ConfigError, Dispatcher, FromEnv, Janitor, MemoryStore, QueueSettings, QueueStore,
    QuoteQueue, RedisStore, RetryConfig, init_metrics,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::health::{HealthState, health_router};
use crate::processor::AcknowledgeProcessor;

/// Worker configuration: the queue settings plus process-level knobs
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub queue: QueueSettings,
    /// `QUOTE_WORKER_HEALTH_PORT`, then `HEALTH_PORT` (default 8082)
    pub health_port: u16,
    /// `QUEUE_STATS_INTERVAL_SECS` (default 60)
    pub stats_interval: Duration,
}

impl FromEnv for WorkerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let health_port = if std::env::var("QUOTE_WORKER_HEALTH_PORT").is_ok() {
            env_parse("QUOTE_WORKER_HEALTH_PORT", 8082u16)?
        } else {
            env_parse("HEALTH_PORT", 8082u16)?
        };

        Ok(Self {
            queue: QueueSettings::from_env()?,
            health_port,
            stats_interval: non_zero(
                "QUEUE_STATS_INTERVAL_SECS",
                Duration::from_secs(env_parse("QUEUE_STATS_INTERVAL_SECS", 60u64)?),
            )?,
        })
    }
}

/// Build the store selected by `QUEUE_BACKEND`
///
/// Redis is connected with retry and verified with PING before returning.
pub async fn connect_store(settings: &QueueSettings) -> Result<Arc<dyn QueueStore>> {
    match settings.backend {
        Backend::Memory => {
            info!(max_size = settings.max_size, "Using in-process queue store");
            Ok(Arc::new(MemoryStore::new(settings.max_size)))
        }
        Backend::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .ok_or_else(|| eyre::eyre!("REDIS_URL is required for the redis backend"))?;

            info!(key_prefix = %settings.key_prefix, "Connecting to Redis...");
            let store =
                RedisStore::connect(url, settings.redis_store_config(), &RetryConfig::default())
                    .await
                    .wrap_err("Failed to connect to Redis")?;
            info!("Connected to Redis successfully");
            Ok(Arc::new(store))
        }
    }
}

/// Run the quote worker
///
/// 1. Loads settings and sets up tracing (JSON in production, pretty otherwise)
/// 2. Installs the Prometheus recorder
/// 3. Connects the configured backend
/// 4. Runs the dispatcher, janitor, stats reporter and probe server until a
///    shutdown signal arrives
///
/// # Errors
///
/// Returns an error if configuration is invalid, the backend cannot be
/// reached, or the dispatcher stops with a fatal error.
pub async fn run() -> Result<()> {
    let settings = WorkerSettings::from_env().wrap_err("Failed to load worker configuration")?;
    telemetry::init_tracing(&settings.queue.environment);

    init_metrics().wrap_err("Failed to initialize metrics")?;

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        backend = %settings.queue.backend,
        workers = settings.queue.workers,
        max_size = settings.queue.max_size,
        "Starting quote worker"
    );

    let store = connect_store(&settings.queue).await?;
    let queue = QuoteQueue::new(store.clone())
        .with_defaults(settings.queue.enqueue_defaults())
        .with_priority_rule(settings.queue.priority_rule())
        .with_alert_thresholds(settings.queue.alert_thresholds());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(queue.clone());
    let health_port = settings.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    let janitor = Janitor::new(store.clone(), settings.queue.janitor_config());
    let janitor_shutdown = shutdown_rx.clone();
    let janitor_handle = tokio::spawn(async move { janitor.run(janitor_shutdown).await });

    let stats_handle = tokio::spawn(report_stats(
        queue,
        settings.stats_interval,
        shutdown_rx.clone(),
    ));

    let dispatcher = Dispatcher::new(
        store,
        AcknowledgeProcessor,
        settings.queue.dispatcher_config(),
    );
    let result = dispatcher.run(shutdown_rx).await;

    if let Err(e) = janitor_handle.await {
        warn!(error = %e, "Janitor task ended abnormally");
    }
    if let Err(e) = stats_handle.await {
        warn!(error = %e, "Stats reporter ended abnormally");
    }

    result.wrap_err("Dispatcher stopped with an error")?;
    info!("Quote worker stopped");
    Ok(())
}

async fn start_health_server(state: HealthState, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {addr}"))?;

    info!(port, "Health server listening");

    axum::serve(listener, health_router(state))
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Log a stats snapshot every `interval`, warning on crossed thresholds
async fn report_stats(queue: QuoteQueue, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match queue.check_alerts().await {
                    Ok((stats, alerts)) => info!(
                        pending = stats.pending_count,
                        processing = stats.processing_count,
                        completed = stats.completed_count,
                        failed = stats.failed_count,
                        cancelled = stats.cancelled_count,
                        utilization = stats.utilization(),
                        alerts = alerts.len(),
                        "Queue stats"
                    ),
                    Err(e) => warn!(error = %e, "Failed to collect queue stats"),
                }
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating shutdown..."),
    }
}
