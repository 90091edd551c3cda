#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use todolist_server::db::{NewUser, User, UserStore};
use todolist_server::error::CacheError;
use todolist_server::{AppError, AppState, CacheStore, MemoryCache, Settings};

mock! {
    pub Users {}

    #[async_trait]
    impl UserStore for Users {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
        async fn create_user(&self, new_user: &NewUser) -> Result<User, AppError>;
    }
}

pub const PASSWORD: &str = "password123";

pub fn user(id: i64, email: &str) -> User {
    let now = Utc::now();
    User {
        id,
        username: format!("user{}", id),
        email: email.to_string(),
        password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
        created_at: now,
        updated_at: now,
    }
}

/// A user store that knows the given accounts and accepts any registration.
pub fn users_with(accounts: Vec<User>) -> MockUsers {
    let mut users = MockUsers::new();
    users.expect_find_by_email().returning(move |email| {
        Ok(accounts.iter().find(|u| u.email == email).cloned())
    });
    users.expect_create_user().returning(|new_user| {
        let now = Utc::now();
        Ok(User {
            id: 100,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            created_at: now,
            updated_at: now,
        })
    });
    users
}

pub fn settings() -> Settings {
    Settings::new_for_test().expect("Failed to load test config")
}

pub fn state_with(settings: Settings, users: MockUsers) -> (AppState, MemoryCache) {
    let cache = MemoryCache::new();
    let state = AppState::from_parts(&settings, Arc::new(users), Arc::new(cache.clone()));
    (state, cache)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// A cache whose every command fails, as when Redis is down.
pub struct UnreachableCache;

fn refused() -> CacheError {
    CacheError::ConnectionError("connection refused".to_string())
}

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(refused())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(refused())
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(refused())
    }

    async fn increment(&self, _key: &str, _by: i64) -> Result<i64, CacheError> {
        Err(refused())
    }

    async fn expire_at(&self, _key: &str, _at: DateTime<Utc>) -> Result<bool, CacheError> {
        Err(refused())
    }
}
