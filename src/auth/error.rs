//! Typed failures returned by the session manager and the auth facade.

use thiserror::Error;

use super::store::StoreError;
use super::token::TokenError;

/// Every failure a caller of the auth core can observe.
///
/// Credential failures deliberately share one variant: callers must not be able
/// to tell an unknown email from a wrong password.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("session not found")]
    SessionNotFound,
    #[error("refresh token reuse detected")]
    TokenReuseDetected,
    #[error("concurrent refresh lost the rotation race")]
    ConcurrentRefresh,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("credential store unavailable")]
    StoreUnavailable(#[source] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable, machine readable name of the error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::EmailTaken => "email_taken",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::SessionNotFound => "session_not_found",
            Self::TokenReuseDetected => "token_reuse_detected",
            Self::ConcurrentRefresh => "concurrent_refresh",
            Self::Validation(_) => "validation",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the transport should answer with a generic "unauthorized".
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::InvalidToken
                | Self::TokenExpired
                | Self::SessionNotFound
                | Self::TokenReuseDetected
                | Self::ConcurrentRefresh
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err)
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::WrongRole => {
                Self::InvalidToken
            }
            TokenError::Encode(err) => Self::Internal(err.to_string()),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
