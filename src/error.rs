use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};

use crate::response::ApiResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl AppError {
    /// Short summary placed in the envelope's `message` field.
    fn summary(&self) -> &'static str {
        match self {
            AppError::AuthError(AuthError::InvalidToken)
            | AppError::AuthError(AuthError::SessionExpired)
            | AppError::AuthError(AuthError::TokenMismatch) => "Token is not valid",
            AppError::AuthError(AuthError::TooManyRequests) => "Rate limit exceeded",
            _ => "Failed to process request",
        }
    }

    /// Client-facing detail. Infrastructure faults are reported generically.
    fn detail(&self) -> String {
        match self {
            AppError::AuthError(e) => e.to_string(),
            AppError::ValidationError(msg) => msg.clone(),
            AppError::DatabaseError(DatabaseError::Duplicate(what)) => what.clone(),
            AppError::DatabaseError(DatabaseError::NotFound) => "Record not found".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ApiResponse::<()>::error(
            status,
            self.summary(),
            self.detail(),
        ))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::MissingToken => StatusCode::BAD_REQUEST,
                AuthError::MalformedHeader => StatusCode::BAD_REQUEST,
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::SessionExpired => StatusCode::UNAUTHORIZED,
                AuthError::TokenMismatch => StatusCode::UNAUTHORIZED,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::LogoutFailed => StatusCode::UNAUTHORIZED,
                AuthError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
                AuthError::SigningFault => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(DatabaseError::Duplicate(_)) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token found")]
    MissingToken,

    #[error("Bearer token not in proper format")]
    MalformedHeader,

    #[error("Token is not valid")]
    InvalidToken,

    #[error("Token does not exist or expired")]
    SessionExpired,

    #[error("Token has been replaced by a newer session")]
    TokenMismatch,

    #[error("Invalid credential")]
    InvalidCredentials,

    #[error("Failed to logout")]
    LogoutFailed,

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Signature failed")]
    SigningFault,
}

/// Failures of the token codec. Callers collapse everything except
/// `Signing` into `AuthError::InvalidToken`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token expired")]
    Expired,

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::MalformedToken(err.to_string()),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(_) => AuthError::SigningFault,
            _ => AuthError::InvalidToken,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Command failed: {0}")]
    CommandError(String),

    #[error("Value at {0} is not an integer")]
    NotAnInteger(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            CacheError::ConnectionError(err.to_string())
        } else {
            CacheError::CommandError(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("{0}")]
    Duplicate(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DatabaseError::Duplicate("Email already exists".to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionError(err.to_string())
            }
            _ => DatabaseError::QueryError(err.to_string()),
        }
    }
}
