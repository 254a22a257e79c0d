//! Login, code verification and token refresh endpoints, plus the bearer
//! token guard for staff routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, JsonBody, ValidationErrorBuilder};
use super::validation::{
    validate_login_username, validate_otp_code, validate_password, validate_uuid,
};
use crate::auth::{LoginOutcome, TokenPair, TokenType};
use crate::db::Account;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLoginRequest {
    #[serde(default)]
    pub otp_id: String,
    #[serde(default)]
    pub otp_code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: String,
}

/// Either tokens (regular accounts) or a pending challenge (staff)
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(TokenPair),
    #[serde(rename_all = "camelCase")]
    OtpRequired { otp_id: String, detail: &'static str },
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_login_username(&request.username) {
        errors.add("username", e);
    }
    if let Err(e) = validate_password(&request.password) {
        errors.add("password", e);
    }
    errors.finish()?;

    let outcome = state
        .login
        .submit_credentials(&request.username, &request.password)
        .await?;

    Ok(Json(match outcome {
        LoginOutcome::Tokens(pair) => LoginResponse::Tokens(pair),
        LoginOutcome::OtpRequired { otp_id } => LoginResponse::OtpRequired {
            otp_id,
            detail: "confirm-login-otp",
        },
    }))
}

/// POST /auth/verify-login
pub async fn verify_login(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<VerifyLoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_uuid(&request.otp_id, "otpId") {
        errors.add("otpId", e);
    }
    if let Err(e) = validate_otp_code(&request.otp_code, state.config.otp.code_length) {
        errors.add("otpCode", e);
    }
    errors.finish()?;

    let pair = state
        .login
        .submit_otp(&request.otp_id, &request.otp_code)
        .await?;
    Ok(Json(pair))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    if request.refresh.is_empty() {
        return Err(ApiError::validation_field("refresh", "Refresh token is required"));
    }
    let access = state.login.refresh(&request.refresh).await?;
    Ok(Json(RefreshResponse { access }))
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid access token belonging to an active staff account.
/// The account is re-read so a lockout takes effect immediately.
pub async fn require_staff(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))?;
    let claims = state.login.tokens().validate(token, TokenType::Access)?;

    let account = Account::get_by_id(&state.db, &claims.sub)
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(|| ApiError::unauthorized("Account is not active"))?;
    if !account.is_staff {
        return Err(ApiError::forbidden("Staff access required"));
    }

    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}
