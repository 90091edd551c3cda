use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::gate::{authorization_header, Principal};
use crate::db::User;
use crate::error::AppError;
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request");
    match state.auth_service.authenticate(&req.email, &req.password).await {
        Ok((user, token)) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            StatusCode::OK,
            "Login successfully",
            LoginResponse { user, token },
        ))),
        Err(e) => {
            warn!("Login failed: {}", e);
            Err(e)
        }
    }
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = state
        .auth_service
        .register(&req.username, &req.email, &req.password)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(
        StatusCode::CREATED,
        "Register Success",
        user,
    )))
}

pub async fn refresh(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let header = authorization_header(req.headers())?;
    let token = state.auth_service.refresh(header).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        StatusCode::OK,
        "Refresh token successfully",
        TokenResponse { token },
    )))
}

pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let header = authorization_header(req.headers())?;
    state.auth_service.logout(header).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::message(StatusCode::OK, "Successfully logged out")))
}

/// Lets clients check that their token is still the live session.
pub async fn verify_token(principal: Principal) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(
        StatusCode::OK,
        "Token verification success.",
        principal,
    ))
}
