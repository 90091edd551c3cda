use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::CacheStore;
use crate::error::CacheError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-process cache mirroring the Redis semantics the service relies on.
/// Expired entries are dropped when touched, and by [`MemoryCache::spawn_sweeper`]
/// for keys nobody touches again.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Runs [`MemoryCache::cleanup`] every `period` until the last handle
    /// to this cache is dropped.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        info!("Starting in-process cache sweeper (interval: {:?})", period);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(entries) = entries.upgrade() else {
                    debug!("In-process cache dropped, stopping sweeper");
                    break;
                };

                let removed = MemoryCache { entries }.cleanup().await;
                if removed > 0 {
                    debug!("Swept {} expired cache entries", removed);
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::CommandError(e.to_string()))?;
        let entry = Entry {
            value: value.to_string(),
            expires_at: Some(Utc::now() + ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(Utc::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.entries.write().await.remove(key);
        Ok(matches!(removed, Some(entry) if !entry.is_expired(Utc::now())))
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
        let next = current + by;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> Result<bool, CacheError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };

        if entry.is_expired(now) || at <= now {
            let was_live = !entry.is_expired(now);
            entries.remove(key);
            return Ok(was_live);
        }

        entry.expires_at = Some(at);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_set_get_and_overwrite() {
        let cache = MemoryCache::new();
        cache.set("token1", "a", Duration::from_secs(60)).await.unwrap();
        cache.set("token1", "b", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("token1").await.unwrap().as_deref(), Some("b"));
        assert_eq!(cache.get("token2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_ttl_expires() {
        let cache = MemoryCache::new();
        cache.set("token1", "a", Duration::from_millis(50)).await.unwrap();
        sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.get("token1").await.unwrap(), None);
        assert!(!cache.delete("token1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let cache = MemoryCache::new();
        cache.set("token1", "a", Duration::from_secs(60)).await.unwrap();

        assert!(cache.delete("token1").await.unwrap());
        assert!(!cache.delete("token1").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_starts_from_zero_and_rejects_text() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("hits", 1).await.unwrap(), 1);
        assert_eq!(cache.increment("hits", 2).await.unwrap(), 3);
        assert_eq!(cache.get("hits").await.unwrap().as_deref(), Some("3"));

        cache.set("token1", "eyJ", Duration::from_secs(60)).await.unwrap();
        assert!(matches!(
            cache.increment("token1", 1).await,
            Err(CacheError::NotAnInteger(_))
        ));
    }

    #[tokio::test]
    async fn test_expire_at() {
        let cache = MemoryCache::new();
        assert!(!cache.expire_at("missing", Utc::now()).await.unwrap());

        cache.increment("hits", 1).await.unwrap();
        let at = Utc::now() + chrono::Duration::milliseconds(50);
        assert!(cache.expire_at("hits", at).await.unwrap());
        sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("hits").await.unwrap(), None);

        // counting restarts once the window is gone
        assert_eq!(cache.increment("hits", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expire_at_in_the_past_deletes() {
        let cache = MemoryCache::new();
        cache.increment("hits", 1).await.unwrap();

        assert!(cache.expire_at("hits", Utc::now() - chrono::Duration::seconds(1)).await.unwrap());
        assert_eq!(cache.get("hits").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_entries() {
        let cache = MemoryCache::new();
        cache.set("short", "a", Duration::from_millis(10)).await.unwrap();
        cache.set("long", "b", Duration::from_secs(60)).await.unwrap();
        sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.cleanup().await, 1);
        assert_eq!(cache.entries.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_drops_untouched_expired_entries() {
        let cache = MemoryCache::new();
        let _sweeper = cache.spawn_sweeper(Duration::from_millis(20));

        for n in 0..50 {
            let key = format!("rate_limit:10.0.0.{}", n);
            cache.increment(&key, 1).await.unwrap();
            cache
                .expire_at(&key, Utc::now() + chrono::Duration::milliseconds(30))
                .await
                .unwrap();
        }
        cache.set("token1", "a", Duration::from_secs(60)).await.unwrap();

        sleep(Duration::from_millis(150)).await;

        let entries = cache.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("token1"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_with_cache() {
        let cache = MemoryCache::new();
        let sweeper = cache.spawn_sweeper(Duration::from_millis(10));
        drop(cache);

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper kept running after the cache was dropped")
            .unwrap();
    }
}
