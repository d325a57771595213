//! Signing configuration for the two token roles.

use secrecy::{ExposeSecret, SecretString};

use super::token::TokenRole;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 14 * 24 * 60 * 60;
pub const MIN_SECRET_LENGTH: usize = 32;

/// Secrets and lifetimes for access and refresh tokens.
///
/// Passed to every session manager call instead of being cached globally, so the
/// facade can swap it at runtime to rotate keys.
#[derive(Clone)]
pub struct JwtConfig {
    expires_in: i64,
    secret: SecretString,
    refresh_expires_in: i64,
    refresh_secret: SecretString,
}

impl JwtConfig {
    #[must_use]
    pub fn new(secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            expires_in: DEFAULT_ACCESS_TTL_SECONDS,
            secret,
            refresh_expires_in: DEFAULT_REFRESH_TTL_SECONDS,
            refresh_secret,
        }
    }

    #[must_use]
    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_expires_in(mut self, seconds: i64) -> Self {
        self.refresh_expires_in = seconds;
        self
    }

    /// Access token lifetime in seconds.
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        self.expires_in
    }

    /// Refresh token lifetime in seconds.
    #[must_use]
    pub fn refresh_expires_in(&self) -> i64 {
        self.refresh_expires_in
    }

    #[must_use]
    pub fn ttl(&self, role: TokenRole) -> i64 {
        match role {
            TokenRole::Access => self.expires_in,
            TokenRole::Refresh => self.refresh_expires_in,
        }
    }

    #[must_use]
    pub fn secret(&self, role: TokenRole) -> &[u8] {
        match role {
            TokenRole::Access => self.secret.expose_secret().as_bytes(),
            TokenRole::Refresh => self.refresh_secret.expose_secret().as_bytes(),
        }
    }

    /// Check lifetimes and secrets before the config is put into service.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.expires_in <= 0 || self.refresh_expires_in <= 0 {
            return Err("token lifetimes must be positive".to_string());
        }
        if self.refresh_expires_in < self.expires_in {
            return Err("refresh token lifetime must not be shorter than access".to_string());
        }
        let access = self.secret.expose_secret();
        let refresh = self.refresh_secret.expose_secret();
        if access.len() < MIN_SECRET_LENGTH || refresh.len() < MIN_SECRET_LENGTH {
            return Err(format!(
                "token secrets must be at least {MIN_SECRET_LENGTH} bytes"
            ));
        }
        if access == refresh {
            return Err("access and refresh secrets must differ".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("expires_in", &self.expires_in)
            .field("secret", &"***")
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("refresh_secret", &"***")
            .finish()
    }
}
