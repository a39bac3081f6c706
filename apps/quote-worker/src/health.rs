//! Probe and metrics endpoints served next to the worker.
//!
//! - Liveness: `/health`, `/healthz`
//! - Readiness: `/ready`, `/readyz` (backend connectivity plus a stats snapshot)
//! - Queue stats: `/stats`
//! - Prometheus metrics: `/metrics`

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use quote_queue::{HealthReport, QueueStats, QuoteQueue, metrics};
use serde::Serialize;
use serde_json::{Value, json};

/// Shared state for the probe endpoints
#[derive(Clone)]
pub struct HealthState {
    pub queue: QuoteQueue,
    pub app_name: &'static str,
    pub app_version: &'static str,
}

impl HealthState {
    pub fn new(queue: QuoteQueue) -> Self {
        Self {
            queue,
            app_name: env!("CARGO_PKG_NAME"),
            app_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Liveness response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

/// Always OK while the process is serving requests.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
        backend: state.queue.backend().as_str(),
    })
}

/// 503 when the backend cannot be reached.
pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.queue.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn stats_handler(
    State(state): State<HealthState>,
) -> Result<Json<QueueStats>, (StatusCode, Json<Value>)> {
    state.queue.get_stats().await.map(Json).map_err(|e| {
        let status = if e.is_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": e.to_string() })))
    })
}

/// Prometheus text format for scraping.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized. Call init_metrics() at startup.".to_string(),
        )
            .into_response(),
    }
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
