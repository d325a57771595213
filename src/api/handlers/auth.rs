//! `/v1/auth/*` endpoints.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{client_origin, require_bearer_token, ErrorResponse};
use crate::auth::{Auth, AuthError, TokenPair};

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(ToSchema, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, epoch seconds.
    pub expires_at: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_at: pair.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevokedResponse {
    pub revoked: u64,
}

fn require_payload<T>(payload: Option<Json<T>>) -> Result<T, AuthError> {
    payload
        .map(|Json(payload)| payload)
        .ok_or_else(|| AuthError::Validation("missing or malformed payload".to_string()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = TokenResponse),
        (status = 400, description = "Missing payload", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(auth): Extension<Arc<Auth>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<TokenResponse>, AuthError> {
    let request = require_payload(payload)?;
    let origin = client_origin(&headers, peer.as_ref());
    debug!(%origin, "login attempt");
    let pair = auth
        .login(&request.email, &request.password, &origin)
        .await?;
    Ok(Json(pair.into()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Identity created"),
        (status = 400, description = "Invalid email or password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signup(
    Extension(auth): Extension<Arc<Auth>>,
    payload: Option<Json<SignupRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let request = require_payload(payload)?;
    auth.signup(
        &request.email,
        &request.password,
        &request.password_confirmation,
    )
    .await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "Session rotated", body = TokenResponse),
        (status = 401, description = "Invalid, expired, reused or superseded refresh token", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse),
    ),
    security(("bearer_refresh" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AuthError> {
    let token = require_bearer_token(&headers)?;
    let pair = auth.refresh_token(&token).await?;
    Ok(Json(pair.into()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Invalid or expired access token", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse),
    ),
    security(("bearer_access" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let token = require_bearer_token(&headers)?;
    auth.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout/all",
    responses(
        (status = 200, description = "Every session of the user revoked", body = RevokedResponse),
        (status = 401, description = "Invalid or expired access token", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse),
    ),
    security(("bearer_access" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout_all(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
) -> Result<Json<RevokedResponse>, AuthError> {
    let token = require_bearer_token(&headers)?;
    let revoked = auth.logout_all(&token).await?;
    Ok(Json(RevokedResponse { revoked }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed, every session revoked"),
        (status = 400, description = "New password rejected", body = ErrorResponse),
        (status = 401, description = "Invalid token or wrong current password", body = ErrorResponse),
        (status = 503, description = "Credential store unavailable", body = ErrorResponse),
    ),
    security(("bearer_access" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn change_password(
    Extension(auth): Extension<Arc<Auth>>,
    headers: HeaderMap,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let token = require_bearer_token(&headers)?;
    let request = require_payload(payload)?;
    auth.change_password(
        &token,
        &request.password,
        &request.new_password,
        &request.new_password_confirmation,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
