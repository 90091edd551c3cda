use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use super::gate::{AuthGate, Principal};
use super::session::SessionRegistry;
use super::token::TokenCodec;
use crate::cache::CacheStore;
use crate::config::AuthConfig;
use crate::db::{NewUser, User, UserStore};
use crate::error::{AppError, AuthError, DatabaseError, TokenError};

/// Token issuance flows: login, refresh, logout and registration.
///
/// Every issuance writes through the session registry, replacing whatever
/// token the user held before.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    codec: Arc<TokenCodec>,
    sessions: SessionRegistry,
    gate: AuthGate,
    token_ttl: Duration,
    password_hash_cost: u32,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, cache: Arc<dyn CacheStore>, config: &AuthConfig) -> Self {
        let codec = Arc::new(TokenCodec::from_config(config));
        let sessions = SessionRegistry::new(cache);

        Self {
            users,
            gate: AuthGate::new(codec.clone(), sessions.clone()),
            codec,
            sessions,
            token_ttl: Duration::seconds(config.jwt_ttl_secs),
            password_hash_cost: config.password_hash_cost,
        }
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Login with email and password. Returns the user and a fresh token.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(User, String), AppError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            warn!("Password mismatch for user {}", user.id);
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.issue_session(user.id).await?;
        info!("Issued session token for user {}", user.id);
        Ok((user, token))
    }

    /// Issuance for an identity provider that has already verified `email`.
    pub async fn issue_for_verified_email(&self, email: &str) -> Result<String, AppError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let token = self.issue_session(user.id).await?;
        info!("Issued session token for externally verified user {}", user.id);
        Ok(token)
    }

    /// Replaces the caller's current token with a new one.
    pub async fn refresh(&self, header: Option<&str>) -> Result<String, AppError> {
        let principal = self.gate.validate(header).await?;
        let token = self.issue_session(principal.user_id).await?;
        info!("Refreshed session token for user {}", principal.user_id);
        Ok(token)
    }

    pub async fn logout(&self, header: Option<&str>) -> Result<Principal, AppError> {
        let principal = self.gate.validate(header).await?;

        if !self.sessions.delete(principal.user_id).await? {
            warn!("No session to remove for user {}", principal.user_id);
            return Err(AuthError::LogoutFailed.into());
        }

        info!("User {} logged out", principal.user_id);
        Ok(principal)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User, AppError> {
        validate_registration(username, email, password)?;

        if self.users.find_by_email(email).await?.is_some() {
            return Err(DatabaseError::Duplicate("Email already exists".to_string()).into());
        }

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password, self.password_hash_cost).await?,
        };

        let user = self.users.create_user(&new_user).await?;
        info!("Registered user {}", user.id);
        Ok(user)
    }

    async fn issue_session(&self, user_id: i64) -> Result<String, AppError> {
        let expires_at = Utc::now() + self.token_ttl;

        let token = self.codec.issue(user_id, expires_at).map_err(|e| {
            if let TokenError::Signing(reason) = &e {
                error!("Token signing failed, check the JWT secret configuration: {}", reason);
            }
            AuthError::from(e)
        })?;

        // A zero TTL would be rejected by the cache.
        let ttl = (expires_at - Utc::now())
            .to_std()
            .unwrap_or_default()
            .max(std::time::Duration::from_secs(1));
        self.sessions.put(user_id, &token, ttl).await?;

        Ok(token)
    }
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), AppError> {
    let username_len = username.chars().count();
    if !(3..=50).contains(&username_len) {
        return Err(AppError::ValidationError(
            "Username must be between 3 and 50 characters".to_string(),
        ));
    }

    let valid_email = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid_email || email.len() > 255 {
        return Err(AppError::ValidationError("Invalid email address".to_string()));
    }

    if password.chars().count() < 6 {
        return Err(AppError::ValidationError(
            "Password must be at least 6 characters".to_string(),
        ));
    }

    Ok(())
}

async fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .map_err(|e| AppError::InternalError(format!("Failed to hash a password: {}", e)))
}

async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let (password, hash) = (password.to_string(), hash.to_string());
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    // An unparsable stored hash can never match.
    Ok(verified.unwrap_or(false))
}
