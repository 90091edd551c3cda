pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, RateLimiter, RateLimitConfig};
pub use cache::{CacheStore, MemoryCache};
pub use db::{DbOperations, User, UserStore};

use auth::handlers::{login, logout, refresh, register, verify_token};
use auth::{RequireAuth, RateLimit};
use response::ApiResponse;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(
        StatusCode::OK,
        "healthy",
        serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }),
    ))
}

/// Unreadable JSON bodies are answered with the standard error envelope.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        AppError::ValidationError(format!("Invalid request body: {}", err)).into()
    })
}

/// Route table. Every route is rate limited; `/api/v1/test` additionally
/// requires a live session.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("")
            .wrap(RateLimit)
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api/v1/auth")
                    .route("/login", web::post().to(login))
                    .route("/register", web::post().to(register))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout)),
            )
            .service(
                web::scope("/api/v1/test")
                    .wrap(RequireAuth)
                    .route("/token", web::get().to(verify_token)),
            ),
    );
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub rate_limiter: Arc<RateLimiter>,
    db: Option<Arc<DbOperations>>,
}

impl AppState {
    pub async fn new(config: &Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(5),
        )
        .await?;
        db.migrate().await?;
        let db = Arc::new(db);

        let cache = cache::connect(&config.redis).await?;

        let mut state = Self::from_parts(config, db.clone(), cache);
        state.db = Some(db);
        Ok(state)
    }

    /// Assembles the state from already-connected collaborators.
    pub fn from_parts(
        config: &Settings,
        users: Arc<dyn UserStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let auth_service = AuthService::new(users, cache.clone(), &config.auth);
        let rate_limiter = RateLimiter::new(cache, RateLimitConfig::from(&config.rate_limit));

        Self {
            auth_service: Arc::new(auth_service),
            rate_limiter: Arc::new(rate_limiter),
            db: None,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.close().await;
        }
        Ok(())
    }
}
