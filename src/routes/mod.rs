pub mod health;
pub mod providers;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/ready", get(health::ready))
        .route("/live", get(health::live))
        // Provider endpoints
        .route("/providers", get(providers::list_providers))
        .route("/providers/:key/channels", get(providers::get_channels))
        .route("/providers/:key/guide", get(providers::get_guide))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
