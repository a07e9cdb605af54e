use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::info;

use super::store::{CacheBackend, CacheError, Result};

/// Keys fetched per SCAN round trip during pattern deletes
const SCAN_BATCH: usize = 200;

/// Redis-backed cache shared by every service instance.
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so each
/// command clones it instead of holding a lock.
pub struct RedisCacheBackend {
    conn: ConnectionManager,
    default_ttl: Option<Duration>,
}

impl RedisCacheBackend {
    /// Connects to Redis. Accepts `redis://` and TLS `rediss://` URLs.
    pub async fn connect(url: &str, default_ttl: Option<Duration>) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::InvalidConfig(format!("invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client).await?;

        info!("Connected to Redis session cache");

        Ok(Self { conn, default_ttl })
    }

    fn ttl_secs(&self, ttl: Option<Duration>) -> Option<u64> {
        ttl.or(self.default_ttl).map(|d| d.as_secs().max(1))
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match self.ttl_secs(ttl) {
            Some(secs) => conn.set_ex::<_, _, ()>(key, value.as_ref(), secs).await?,
            None => conn.set::<_, _, ()>(key, value.as_ref()).await?,
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        // SCAN instead of KEYS so a busy shared cache is never blocked.
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: usize = conn.del(&keys).await?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(deleted)
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await?;
        if value == 1
            && let Some(secs) = self.ttl_secs(ttl)
        {
            conn.expire::<_, ()>(key, secs as i64).await?;
        }
        Ok(value)
    }

    fn backend_type(&self) -> &str {
        "redis"
    }
}
