//! Session cache store with pluggable backends.
//!
//! Per-call state (id mappings, caller payload, chat history, retry counters)
//! lives here, addressed by keys of the form `{kind}:{id}`. Redis is used in
//! production so that every instance behind the load balancer sees the same
//! call state; the moka-backed memory backend serves local runs and tests.

use async_trait::async_trait;
use bytes::Bytes;
use glob::Pattern;
use moka::future::{Cache as MokaCache, CacheBuilder as MokaCacheBuilder};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::redis_backend::RedisCacheBackend;

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend-specific error.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Trait defining the interface for cache backends.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Stores a value with an optional TTL.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Retrieves a value by key.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Checks if a key exists in the cache.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Deletes a value by key.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes every key matching a glob pattern (`*` and `?`), returning the count.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize>;

    /// Atomically increments an integer counter, creating it at 0 first.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64>;

    /// Returns the backend type as a string identifier.
    fn backend_type(&self) -> &str;
}

/// Metrics tracking for cache operations.
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<RwLock<u64>>,
    misses: Arc<RwLock<u64>>,
    sets: Arc<RwLock<u64>>,
    deletes: Arc<RwLock<u64>>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Creates a new metrics instance.
    pub fn new() -> Self {
        Self {
            hits: Arc::new(RwLock::new(0)),
            misses: Arc::new(RwLock::new(0)),
            sets: Arc::new(RwLock::new(0)),
            deletes: Arc::new(RwLock::new(0)),
        }
    }

    pub fn record_hit(&self) {
        *self.hits.write() += 1;
    }

    pub fn record_miss(&self) {
        *self.misses.write() += 1;
    }

    pub fn record_set(&self) {
        *self.sets.write() += 1;
    }

    pub fn record_deletes(&self, count: u64) {
        *self.deletes.write() += count;
    }

    /// Returns current statistics as a tuple (hits, misses, sets, deletes).
    pub fn get_stats(&self) -> (u64, u64, u64, u64) {
        (
            *self.hits.read(),
            *self.misses.read(),
            *self.sets.read(),
            *self.deletes.read(),
        )
    }
}

/// Compile a Redis-style key pattern (`*`, `?` and `[...]` classes).
pub fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| CacheError::InvalidConfig(format!("invalid key pattern '{pattern}': {e}")))
}

/// Whether `key` matches `pattern`. Invalid patterns match nothing.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    compile_pattern(pattern).is_ok_and(|p| p.matches(key))
}

/// Internal structure for memory cache entries with expiration.
struct CacheEntry {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// Memory-based cache backend using Moka.
pub struct MemoryCacheBackend {
    cache: MokaCache<String, Arc<CacheEntry>>,
    default_ttl: Option<Duration>,
    // Serializes read-modify-write counters; moka has no atomic increment.
    incr_lock: tokio::sync::Mutex<()>,
}

impl MemoryCacheBackend {
    /// Creates a new memory cache backend.
    ///
    /// # Arguments
    ///
    /// * `max_entries` - Maximum number of entries to store
    /// * `default_ttl` - Optional default TTL for all entries
    pub fn new(max_entries: u64, default_ttl: Option<Duration>) -> Self {
        Self {
            cache: MokaCacheBuilder::new(max_entries).build(),
            default_ttl,
            incr_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.or(self.default_ttl).map(|d| Instant::now() + d);

        let entry = Arc::new(CacheEntry {
            data: value,
            expires_at,
        });

        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.cache.invalidate(key).await;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data.clone())),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = compile_pattern(pattern)?;
        let matching: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| pattern.matches(key.as_str()))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &matching {
            self.cache.invalidate(key).await;
        }
        Ok(matching.len())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64> {
        let _guard = self.incr_lock.lock().await;

        let current = match self.get(key).await? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    CacheError::Backend(format!("value at '{key}' is not an integer"))
                })?,
            None => 0,
        };

        let next = current + 1;
        self.set(key, Bytes::from(next.to_string()), ttl).await?;
        Ok(next)
    }

    fn backend_type(&self) -> &str {
        "memory"
    }
}

/// Cache configuration options.
#[derive(Debug, Clone)]
pub enum CacheConfig {
    /// Memory-based cache configuration.
    Memory {
        /// Maximum number of entries.
        max_entries: u64,
        /// Optional TTL in seconds.
        ttl_seconds: Option<u64>,
    },
    /// Redis-backed cache configuration.
    Redis {
        /// Connection URL, `redis://` or `rediss://`, password included.
        url: String,
        /// Optional TTL in seconds.
        ttl_seconds: Option<u64>,
    },
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Memory {
            max_entries: 100_000,
            ttl_seconds: Some(24 * 60 * 60),
        }
    }
}

/// Unified cache store with pluggable backends.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    metrics: Arc<CacheMetrics>,
}

impl CacheStore {
    /// Creates a new cache store from configuration.
    pub async fn from_config(config: CacheConfig) -> Result<Self> {
        let backend: Arc<dyn CacheBackend> = match config {
            CacheConfig::Memory {
                max_entries,
                ttl_seconds,
            } => {
                let ttl = ttl_seconds.map(Duration::from_secs);
                Arc::new(MemoryCacheBackend::new(max_entries, ttl))
            }
            CacheConfig::Redis { url, ttl_seconds } => {
                let ttl = ttl_seconds.map(Duration::from_secs);
                Arc::new(RedisCacheBackend::connect(&url, ttl).await?)
            }
        };

        Ok(Self::with_backend(backend))
    }

    /// Wraps an already constructed backend.
    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// Stores a value in the cache.
    pub async fn put(&self, key: impl AsRef<str>, value: impl Into<Bytes>) -> Result<()> {
        let bytes = value.into();

        debug!(
            "Storing cache entry: {} (size: {} bytes)",
            key.as_ref(),
            bytes.len()
        );

        self.backend.set(key.as_ref(), bytes, None).await?;
        self.metrics.record_set();
        Ok(())
    }

    /// Stores a value with a specific TTL.
    pub async fn put_with_ttl(
        &self,
        key: impl AsRef<str>,
        value: impl Into<Bytes>,
        ttl: Duration,
    ) -> Result<()> {
        let bytes = value.into();

        debug!(
            "Storing cache entry with TTL: {} (size: {} bytes, ttl: {:?})",
            key.as_ref(),
            bytes.len(),
            ttl
        );

        self.backend.set(key.as_ref(), bytes, Some(ttl)).await?;
        self.metrics.record_set();
        Ok(())
    }

    /// Retrieves a value from the cache.
    pub async fn get(&self, key: impl AsRef<str>) -> Result<Option<Bytes>> {
        let result = self.backend.get(key.as_ref()).await?;

        if result.is_some() {
            debug!("Cache hit: {}", key.as_ref());
            self.metrics.record_hit();
        } else {
            debug!("Cache miss: {}", key.as_ref());
            self.metrics.record_miss();
        }

        Ok(result)
    }

    /// Retrieves a UTF-8 string value.
    pub async fn get_string(&self, key: impl AsRef<str>) -> Result<Option<String>> {
        match self.get(key.as_ref()).await? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| CacheError::Backend(format!("non UTF-8 value: {e}"))),
            None => Ok(None),
        }
    }

    /// Serializes `value` as JSON and stores it.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: impl AsRef<str>,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_vec(value)?;
        self.put(key, json).await
    }

    /// Retrieves and deserializes a JSON value.
    pub async fn get_json<T: DeserializeOwned>(&self, key: impl AsRef<str>) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Checks if a key exists in the cache.
    pub async fn exists(&self, key: impl AsRef<str>) -> Result<bool> {
        self.backend.exists(key.as_ref()).await
    }

    /// Deletes a value from the cache.
    pub async fn delete(&self, key: impl AsRef<str>) -> Result<()> {
        debug!("Deleting cache entry: {}", key.as_ref());

        self.backend.delete(key.as_ref()).await?;
        self.metrics.record_deletes(1);
        Ok(())
    }

    /// Deletes every key matching a glob pattern.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let deleted = self.backend.delete_by_pattern(pattern).await?;
        if deleted == 0 {
            warn!("No cache entries matched pattern: {}", pattern);
        } else {
            debug!("Deleted {} cache entries matching {}", deleted, pattern);
        }
        self.metrics.record_deletes(deleted as u64);
        Ok(deleted)
    }

    /// Increments an integer counter and returns the new value.
    pub async fn incr(&self, key: impl AsRef<str>) -> Result<i64> {
        self.backend.incr(key.as_ref(), None).await
    }

    /// Returns the cache metrics.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Returns the backend type identifier.
    pub fn backend_type(&self) -> &str {
        self.backend.backend_type()
    }
}
