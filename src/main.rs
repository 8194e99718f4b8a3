mod config;
mod models;
mod routes;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{
    cache::SessionCache,
    cleanup::{start_cleanup_task, CleanupConfig},
    provider::ProviderRegistry,
    redis::RedisService,
    stirr::{StirrClient, StirrProvider, StirrSettings},
    xumo::{XumoClient, XumoProvider, XumoSettings},
};

/// Application state shared across handlers
pub struct AppState {
    pub cache: SessionCache,
    pub registry: ProviderRegistry,
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tvguide_aggregator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting TV Guide Aggregator v{}", env!("CARGO_PKG_VERSION"));

    // Session cache: Redis when configured, in-process LRU otherwise
    let cache = match &config.redis_url {
        Some(url) => {
            let redis = RedisService::new(url).await?;
            tracing::info!("Redis connected: {}", url);
            SessionCache::redis(redis)
        }
        None => {
            tracing::info!(
                "Using in-memory session cache ({} entries)",
                config.session_cache_max_entries
            );
            SessionCache::in_memory(config.session_cache_max_entries)
        }
    };

    // Start cache sweep task (runs in background)
    tokio::spawn(start_cleanup_task(
        cache.clone(),
        CleanupConfig {
            interval_secs: config.cache_sweep_interval_secs,
        },
    ));

    // Shared upstream HTTP client
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.fetch_timeout_ms))
        .gzip(true)
        .build()?;

    // Register providers
    let mut registry = ProviderRegistry::new();

    let xumo = XumoClient::new(http.clone(), cache.clone(), XumoSettings::from_config(&config))?;
    registry.register(Arc::new(XumoProvider::new(xumo, config.fetch_concurrency)));

    let stirr = StirrClient::new(http, StirrSettings::from_config(&config))?;
    registry.register(Arc::new(StirrProvider::new(
        stirr,
        config.stirr_lineups.clone(),
        config.fetch_concurrency,
    )));

    tracing::info!("Stirr lineups: {}", config.stirr_lineups.join(", "));

    // Build application state
    let state = Arc::new(AppState {
        cache,
        registry,
        start_time: Instant::now(),
    });

    let app = routes::router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
