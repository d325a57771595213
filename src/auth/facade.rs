//! Transport-facing entry point.
//!
//! `Auth` validates raw input, resolves bearer tokens into the ids the session
//! manager works with, and supplies the current signing configuration.

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::RwLock;

use super::{
    config::JwtConfig,
    error::{AuthError, AuthResult},
    password::validate_password,
    session::{normalize_email, SessionManager, TokenPair},
    token::Claims,
};

const MAX_EMAIL_LENGTH: usize = 254;

static EMAIL_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$"));

/// Basic email format check on already-normalized input.
fn valid_email(email_normalized: &str) -> bool {
    EMAIL_REGEX
        .as_ref()
        .is_ok_and(|regex| regex.is_match(email_normalized))
}

fn validate_email(email: &str) -> AuthResult<()> {
    let email = normalize_email(email);
    if email.len() > MAX_EMAIL_LENGTH || !valid_email(&email) {
        return Err(AuthError::Validation("invalid email".to_string()));
    }
    Ok(())
}

fn validate_new_password(password: &str, confirmation: &str) -> AuthResult<()> {
    validate_password(password).map_err(AuthError::Validation)?;
    if password != confirmation {
        return Err(AuthError::Validation(
            "password confirmation does not match".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug)]
pub struct Auth {
    manager: SessionManager,
    jwt: RwLock<JwtConfig>,
}

impl Auth {
    #[must_use]
    pub fn new(manager: SessionManager, jwt: JwtConfig) -> Self {
        Self {
            manager,
            jwt: RwLock::new(jwt),
        }
    }

    #[must_use]
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Swap the signing configuration. Tokens signed with the old secrets stop verifying.
    ///
    /// # Errors
    /// `Validation` if the new configuration is unusable; the old one stays in place.
    pub async fn set_jwt_config(&self, jwt: JwtConfig) -> AuthResult<()> {
        jwt.validate().map_err(AuthError::Validation)?;
        *self.jwt.write().await = jwt;
        Ok(())
    }

    async fn jwt(&self) -> JwtConfig {
        self.jwt.read().await.clone()
    }

    /// # Errors
    /// `Validation` for a password outside the length policy, otherwise
    /// `InvalidCredentials` or `StoreUnavailable`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client_origin: &str,
    ) -> AuthResult<TokenPair> {
        validate_password(password).map_err(AuthError::Validation)?;
        let jwt = self.jwt().await;
        self.manager
            .login(email, password, client_origin, &jwt)
            .await
    }

    /// # Errors
    /// `Validation` for malformed input, `EmailTaken` if already registered.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        password_confirmation: &str,
    ) -> AuthResult<()> {
        validate_email(email)?;
        validate_new_password(password, password_confirmation)?;
        self.manager.signup(email, password).await
    }

    /// Rotate the session addressed by the refresh token's own claims.
    ///
    /// # Errors
    /// See [`SessionManager::refresh_token`].
    pub async fn refresh_token(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let jwt = self.jwt().await;
        let claims = self.manager.refresh_claims(refresh_token, &jwt)?;
        self.manager
            .refresh_token(claims.sub, &claims.origin, refresh_token, &jwt)
            .await
    }

    /// Revoke the session the access token was issued for.
    ///
    /// # Errors
    /// `InvalidToken`/`TokenExpired` or `StoreUnavailable`.
    pub async fn logout(&self, access_token: &str) -> AuthResult<()> {
        let claims = self.authenticate(access_token).await?;
        self.manager.logout(claims.sub, &claims.origin).await
    }

    /// # Errors
    /// `InvalidToken`/`TokenExpired` or `StoreUnavailable`.
    pub async fn logout_all(&self, access_token: &str) -> AuthResult<u64> {
        let claims = self.authenticate(access_token).await?;
        self.manager.logout_all(claims.sub).await
    }

    /// # Errors
    /// `Validation` for a rejected new password, `InvalidCredentials` for a wrong old one.
    pub async fn change_password(
        &self,
        access_token: &str,
        old_password: &str,
        new_password: &str,
        new_password_confirmation: &str,
    ) -> AuthResult<()> {
        let claims = self.authenticate(access_token).await?;
        validate_new_password(new_password, new_password_confirmation)?;
        self.manager
            .change_password(claims.sub, old_password, new_password)
            .await
    }

    /// # Errors
    /// `InvalidToken` or `TokenExpired`.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<Claims> {
        let jwt = self.jwt().await;
        self.manager.authenticate(access_token, &jwt)
    }
}
