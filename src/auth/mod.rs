//! Authentication module for the todo-list server
//!
//! Token signing and verification, the one-session-per-user registry,
//! the request gate for protected routes, and per-address rate limiting.

pub mod gate;
pub mod handlers;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod token;

pub use gate::{authorization_header, bearer_token, AuthGate, Principal, RequireAuth};
pub use rate_limit::{RateLimit, RateLimitConfig, RateLimiter};
pub use service::AuthService;
pub use session::SessionRegistry;
pub use token::{ClaimSet, TokenCodec};
