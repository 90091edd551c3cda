use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::Method;
use actix_web::{web, Error};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use tracing::{debug, error, warn};

use crate::cache::CacheStore;
use crate::config::RateLimitSettings;
use crate::error::{AppError, AuthError, CacheError};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window_size: Duration,
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            max_requests: settings.max_requests,
            window_size: Duration::seconds(settings.window_secs),
        }
    }
}

/// Fixed-window request counter per client address.
///
/// The first request of a window starts a counter that expires
/// `window_size` later. Bursts straddling a window boundary can therefore
/// see up to twice `max_requests` in a short span. The read and the
/// increment are separate cache calls, so concurrent requests from one
/// address may be counted slightly late.
pub struct RateLimiter {
    cache: Arc<dyn CacheStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CacheStore>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    fn key(address: &str) -> String {
        format!("rate_limit:{}", address)
    }

    /// Returns true when the request is admitted (and counted).
    pub async fn check(&self, address: &str) -> Result<bool, CacheError> {
        let key = Self::key(address);

        let current = match self.cache.get(&key).await? {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| CacheError::NotAnInteger(key.clone()))?,
            None => 0,
        };

        if current >= self.config.max_requests {
            return Ok(false);
        }

        let count = self.cache.increment(&key, 1).await?;
        if count == 1 {
            self.cache
                .expire_at(&key, Utc::now() + self.config.window_size)
                .await?;
        }

        Ok(true)
    }
}

/// Peer IP of the connection; forwarding headers are not trusted.
fn client_address(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// App-wide middleware applying the shared [`RateLimiter`] by client IP.
#[derive(Clone, Default)]
pub struct RateLimit;

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Arc::new(service),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            // CORS preflight
            if req.method() == Method::OPTIONS {
                return service.call(req).await.map(ServiceResponse::map_into_left_body);
            }

            let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
                let err = AppError::InternalError("application state not registered".into());
                return Ok(req.error_response(err).map_into_right_body());
            };

            let address = client_address(&req);
            match state.rate_limiter.check(&address).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Rate limit exceeded for {} from {}", req.path(), address);
                    let err = AppError::from(AuthError::TooManyRequests);
                    return Ok(req.error_response(err).map_into_right_body());
                }
                // Fail open when the cache is unreachable
                Err(e) => error!("Rate limiter unavailable, admitting {}: {}", address, e),
            }

            debug!("Rate limit passed for {} from {}", req.path(), address);
            service.call(req).await.map(ServiceResponse::map_into_left_body)
        })
    }
}
