//! Key-value cache with expiry.
//!
//! Session records and rate counters live here. Two backends are provided:
//! Redis for deployments, and an in-process map for tests and local runs.

mod memory;
mod redis_cache;

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::RedisConfig;
use crate::error::CacheError;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Adds `by` to the integer at `key` (missing counts as 0) and returns
    /// the new value. Keeps any existing expiry.
    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError>;

    /// Returns false when the key does not exist.
    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool, CacheError>;
}

/// Picks the backend from configuration: Redis when a URL is set,
/// otherwise the in-process cache with a background sweeper.
pub async fn connect(config: &RedisConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    if config.url.is_empty() {
        info!("No Redis URL configured, using in-process cache");
        let cache = MemoryCache::new();
        cache.spawn_sweeper(Duration::from_secs(config.sweep_interval_secs));
        return Ok(Arc::new(cache));
    }

    Ok(Arc::new(RedisCache::connect(&config.url).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_url_selects_in_process_cache() {
        let config = RedisConfig {
            url: String::new(),
            sweep_interval_secs: 60,
        };
        let cache = connect(&config).await.unwrap();

        cache.set("token1", "a", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("token1").await.unwrap().as_deref(), Some("a"));
    }
}
