//! API handlers and the helpers they share: bearer/origin extraction and the
//! `AuthError` to HTTP mapping.

pub mod auth;
pub mod health;

use axum::{
    extract::ConnectInfo,
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// Error body. `code` is left out for credential failures.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str, code: Option<&str>) -> Self {
        Self {
            error: error.to_string(),
            code: code.map(str::to_string),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = if self.is_unauthorized() {
            // Credential failures must not say which check failed.
            let code = (!matches!(self, Self::InvalidCredentials)).then(|| self.code());
            (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("unauthorized", code),
            )
        } else {
            match &self {
                Self::Validation(message) => (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new(message, Some(self.code())),
                ),
                Self::EmailTaken => (
                    StatusCode::CONFLICT,
                    ErrorResponse::new("email already registered", Some(self.code())),
                ),
                Self::StoreUnavailable(source) => {
                    error!("credential store unavailable: {source}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorResponse::new("service unavailable", Some(self.code())),
                    )
                }
                _ => {
                    error!("{self}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("internal error", Some(self.code())),
                    )
                }
            }
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Token from `Authorization: Bearer <token>`.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Bearer token or `InvalidToken`.
pub(crate) fn require_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    extract_bearer_token(headers).ok_or(AuthError::InvalidToken)
}

/// Client IP from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// The origin a session is bound to: proxy headers first, then the peer address.
pub(crate) fn client_origin(
    headers: &HeaderMap,
    peer: Option<&ConnectInfo<SocketAddr>>,
) -> String {
    extract_client_ip(headers)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
