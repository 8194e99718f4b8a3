use lru::LruCache;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::services::redis::RedisService;

/// Cache backend errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache value encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

struct CacheEntry {
    expires_at: Instant,
    payload: String,
}

#[derive(Clone)]
enum CacheBackend {
    Memory(Arc<Mutex<LruCache<String, CacheEntry>>>),
    Redis(RedisService),
}

/// Small key/value cache with per-entry TTL.
///
/// Values are stored JSON-encoded, either in a process-local LRU or in Redis
/// when one is configured. Used for provider session parameters only.
#[derive(Clone)]
pub struct SessionCache {
    backend: CacheBackend,
}

impl SessionCache {
    /// Process-local cache bounded to `max_entries`
    pub fn in_memory(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            backend: CacheBackend::Memory(Arc::new(Mutex::new(LruCache::new(capacity)))),
        }
    }

    /// Cache shared through Redis
    pub fn redis(redis: RedisService) -> Self {
        Self {
            backend: CacheBackend::Redis(redis),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            CacheBackend::Memory(_) => "memory",
            CacheBackend::Redis(_) => "redis",
        }
    }

    /// Get an unexpired value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let payload = match &self.backend {
            CacheBackend::Memory(entries) => {
                let mut entries = entries.lock().await;
                let now = Instant::now();
                if matches!(entries.peek(key), Some(entry) if entry.expires_at <= now) {
                    entries.pop(key);
                    None
                } else {
                    entries.get(key).map(|entry| entry.payload.clone())
                }
            }
            CacheBackend::Redis(redis) => redis.get(key).await?,
        };

        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    /// Store a value for `ttl`
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        match &self.backend {
            CacheBackend::Memory(entries) => {
                let entry = CacheEntry {
                    expires_at: Instant::now() + ttl,
                    payload,
                };
                entries.lock().await.put(key.to_string(), entry);
            }
            CacheBackend::Redis(redis) => {
                redis.set_ex(key, &payload, ttl.as_secs().max(1)).await?;
            }
        }
        Ok(())
    }

    /// Remove a key
    pub async fn evict(&self, key: &str) -> Result<(), CacheError> {
        match &self.backend {
            CacheBackend::Memory(entries) => {
                entries.lock().await.pop(key);
            }
            CacheBackend::Redis(redis) => redis.del(key).await?,
        }
        Ok(())
    }

    /// Return the cached value for `key`, or run `producer` and cache its result.
    ///
    /// A producer error evicts the key so no stale or partial value survives,
    /// then propagates. Cache backend failures degrade to a miss.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::warn!(key, "cache read failed, recomputing: {}", e),
        }

        match producer().await {
            Ok(value) => {
                if let Err(e) = self.put(key, &value, ttl).await {
                    tracing::warn!(key, "cache write failed: {}", e);
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self.evict(key).await {
                    tracing::warn!(key, "cache evict failed: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Drop expired in-memory entries; Redis expires keys on its own
    pub async fn sweep_expired(&self) -> usize {
        let CacheBackend::Memory(entries) = &self.backend else {
            return 0;
        };

        let mut entries = entries.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Number of live in-memory entries (always 0 for Redis)
    pub async fn len(&self) -> usize {
        match &self.backend {
            CacheBackend::Memory(entries) => entries.lock().await.len(),
            CacheBackend::Redis(_) => 0,
        }
    }

    /// Backend reachability
    pub async fn ping(&self) -> bool {
        match &self.backend {
            CacheBackend::Memory(_) => true,
            CacheBackend::Redis(redis) => redis.ping().await.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_put_get_evict() {
        let cache = SessionCache::in_memory(4);
        cache.put("k", &vec!["a".to_string()], TTL).await.unwrap();

        let value: Option<Vec<String>> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(vec!["a".to_string()]));

        cache.evict("k").await.unwrap();
        let value: Option<Vec<String>> = cache.get("k").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = SessionCache::in_memory(4);
        cache.put("k", &1u32, Duration::ZERO).await.unwrap();
        cache.put("live", &2u32, TTL).await.unwrap();

        assert_eq!(cache.get::<u32>("k").await.unwrap(), None);
        cache.put("k2", &3u32, Duration::ZERO).await.unwrap();
        assert_eq!(cache.sweep_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_caches_success() {
        let cache = SessionCache::in_memory(4);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<u32, String> = cache
                .get_or_compute("k", TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_failure_leaves_no_entry() {
        let cache = SessionCache::in_memory(4);
        let value: Result<u32, String> = cache
            .get_or_compute("k", TTL, || async { Err("boom".to_string()) })
            .await;
        assert_eq!(value, Err("boom".to_string()));
        assert_eq!(cache.get::<u32>("k").await.unwrap(), None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_lru_bound() {
        let cache = SessionCache::in_memory(2);
        for i in 0..5u32 {
            cache.put(&format!("k{}", i), &i, TTL).await.unwrap();
        }
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get::<u32>("k4").await.unwrap(), Some(4));
        assert_eq!(cache.get::<u32>("k0").await.unwrap(), None);
        assert_eq!(cache.backend_name(), "memory");
        assert!(cache.ping().await);
    }
}
