//! Redis/Valkey cache backend

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::info;

use super::{Cache, CacheError};

/// Cache backed by a pooled Redis connection
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// Connect and verify the server answers `PING`
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self, CacheError> {
        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| CacheError::Connection(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let cache = Self { pool };
        let mut conn = cache.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        info!(pool_size, "connected to redis cache");
        Ok(cache)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // SET EX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}
