use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::body::EitherBody;
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, Ready};
use serde::Serialize;
use tracing::{debug, warn};

use super::session::SessionRegistry;
use super::token::TokenCodec;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// The authenticated user behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: i64,
}

/// Reads the `Authorization` header. A value that is not visible ASCII is
/// malformed rather than missing.
pub fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::MalformedHeader))
        .transpose()
}

/// Extracts the credential from an `Authorization` header value.
///
/// Exactly `Bearer <token>` is accepted; the token itself must be a single
/// non-empty segment.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = match header.map(str::trim) {
        Some(h) if !h.is_empty() => h,
        _ => return Err(AuthError::MissingToken),
    };

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::MalformedHeader)?;

    if token.is_empty() || token.split_whitespace().count() != 1 {
        return Err(AuthError::MalformedHeader);
    }

    Ok(token)
}

/// Admits a request only when its bearer token verifies and is still the
/// session on record for its user.
pub struct AuthGate {
    codec: Arc<TokenCodec>,
    sessions: SessionRegistry,
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>, sessions: SessionRegistry) -> Self {
        Self { codec, sessions }
    }

    pub async fn validate(&self, header: Option<&str>) -> Result<Principal, AppError> {
        let token = bearer_token(header)?;

        let claims = self.codec.parse_and_verify(token).map_err(|e| {
            debug!("Token rejected by codec: {}", e);
            AuthError::from(e)
        })?;

        let current = self
            .sessions
            .get(claims.user_id)
            .await?
            .ok_or(AuthError::SessionExpired)?;

        if current != token {
            warn!("Superseded token presented for user {}", claims.user_id);
            return Err(AuthError::TokenMismatch.into());
        }

        Ok(Principal { user_id: claims.user_id })
    }
}

impl FromRequest for Principal {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Principal>()
                .copied()
                .ok_or(AppError::AuthError(AuthError::MissingToken)),
        )
    }
}

/// Middleware guarding a scope with [`AuthGate`]. On success the
/// [`Principal`] is stored in the request extensions.
#[derive(Clone, Default)]
pub struct RequireAuth;

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequireAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthService {
            service: Arc::new(service),
        }))
    }
}

pub struct RequireAuthService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthService<S>
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
            let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
                let err = AppError::InternalError("application state not registered".into());
                return Ok(req.error_response(err).map_into_right_body());
            };

            let header = match authorization_header(req.headers()) {
                Ok(header) => header.map(str::to_owned),
                Err(e) => {
                    debug!("Rejected request to {}: {}", req.path(), e);
                    return Ok(req.error_response(AppError::from(e)).map_into_right_body());
                }
            };

            match state.auth_service.gate().validate(header.as_deref()).await {
                Ok(principal) => {
                    req.extensions_mut().insert(principal);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(e) => {
                    debug!("Rejected request to {}: {}", req.path(), e);
                    Ok(req.error_response(e).map_into_right_body())
                }
            }
        })
    }
}
