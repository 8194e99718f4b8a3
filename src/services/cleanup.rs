//! Background sweep for the in-memory session cache
//!
//! Runs once on startup, then periodically, dropping expired entries so the
//! LRU only holds live session parameters.

use std::time::Duration;
use tokio::time;

use crate::services::cache::SessionCache;

/// Configuration for the sweep task
pub struct CleanupConfig {
    /// How often to run the sweep (in seconds)
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600, // Run every hour
        }
    }
}

/// Run a single sweep, returning the number of entries dropped
pub async fn run_cleanup(cache: &SessionCache) -> usize {
    let removed = cache.sweep_expired().await;
    if removed > 0 {
        tracing::info!(cache_gc_expired = removed, msg = "expired session cache entries removed");
    }
    removed
}

/// Start the background sweep task
///
/// This should be spawned as a background task using `tokio::spawn`.
pub async fn start_cleanup_task(cache: SessionCache, config: CleanupConfig) {
    tracing::info!(
        "Starting cache sweep task (interval: {}s, backend: {})",
        config.interval_secs,
        cache.backend_name()
    );

    let mut interval = time::interval(Duration::from_secs(config.interval_secs.max(1)));

    loop {
        // First tick completes immediately
        interval.tick().await;
        run_cleanup(&cache).await;
    }
}
