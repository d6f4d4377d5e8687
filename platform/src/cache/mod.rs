//! Key/value cache with per-key TTL, used by the artifact router

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    Connection(String),

    #[error("cache command failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Value for `key`, `Ok(None)` on miss or expiry
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}
