use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::error::CacheError;

/// Maps each user to the one token currently on record for them.
///
/// `put` overwrites, so issuing a token for a user invalidates every token
/// issued before it: the gate compares the presented token against this
/// record.
#[derive(Clone)]
pub struct SessionRegistry {
    cache: Arc<dyn CacheStore>,
}

impl SessionRegistry {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    fn key(user_id: i64) -> String {
        format!("token{}", user_id)
    }

    pub async fn put(&self, user_id: i64, token: &str, ttl: Duration) -> Result<(), CacheError> {
        self.cache.set(&Self::key(user_id), token, ttl).await
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<String>, CacheError> {
        self.cache.get(&Self::key(user_id)).await
    }

    pub async fn delete(&self, user_id: i64) -> Result<bool, CacheError> {
        self.cache.delete(&Self::key(user_id)).await
    }
}
