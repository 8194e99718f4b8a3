use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "TV Guide Aggregator",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Session cache stats
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheStats {
    backend: &'static str,
    reachable: bool,
    entries: usize,
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    uptime: u64,
    cache: CacheStats,
    providers: usize,
}

/// GET /health - Advanced health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    let cache_ok = state.cache.ping().await;

    // Providers still work against an unreachable cache, they just bootstrap
    // on every call
    let status = if cache_ok { "ok" } else { "degraded" };

    let health = HealthResponse {
        status: status.to_string(),
        uptime,
        cache: CacheStats {
            backend: state.cache.backend_name(),
            reachable: cache_ok,
            entries: state.cache.len().await,
        },
        providers: state.registry.len(),
    };

    Json(health)
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Readiness probe (for Kubernetes)
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.registry.is_empty() {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready - no providers registered");
    }

    if state.cache.ping().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::OK, "ready (cache degraded)")
    }
}

/// Liveness probe (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
