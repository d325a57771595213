//! Session manager: login, signup, refresh rotation, logout and password change.
//!
//! The manager keeps no mutable state of its own. Everything that changes lives
//! in the credential store, and each successful operation ends in exactly one
//! store write (or none, for the read-only paths).
//!
//! Session states:
//! - `ACTIVE -> ACTIVE` on refresh (fingerprint rotated).
//! - `ACTIVE -> REVOKED` on logout, detected reuse, password change, or a new
//!   login from the same origin. A revoked row is never reactivated; a later
//!   login writes a new session id over it.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    clock::{Clock, SystemClock},
    config::JwtConfig,
    error::{AuthError, AuthResult},
    password::PasswordHasher,
    store::{
        CreateIdentityOutcome, CredentialStore, NewSession, PasswordUpdate, RotateOutcome,
        Rotation,
    },
    token::{self, Claims, TokenRole, TokenSubject},
};

/// Tokens handed back after login or refresh.
///
/// `expires_at` is the access token's absolute expiry in epoch seconds, so the
/// client can renew ahead of time.
#[derive(Clone, Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            store,
            hasher,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    /// Verify credentials and open a session for `(user, client_origin)`,
    /// superseding any previous session from that origin.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown email or a wrong password (never
    /// distinguished), `StoreUnavailable` if the store fails.
    #[instrument(skip_all, fields(client_origin = %client_origin))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client_origin: &str,
        config: &JwtConfig,
    ) -> AuthResult<TokenPair> {
        let email = normalize_email(email);
        let identity = self.store.find_identity_by_email(&email).await?;

        // Unknown emails still pay for a verification against the decoy digest.
        let digest = identity.as_ref().map(|identity| identity.password_hash.clone());
        let valid = self.verify_password(password, digest).await?;
        let identity = match identity {
            Some(identity) if valid => identity,
            _ => {
                debug!("login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let now = self.clock.now_unix();
        let subject = TokenSubject {
            user_id: identity.id,
            client_origin: client_origin.to_string(),
            session_id: Uuid::new_v4(),
        };
        let access = token::issue(
            &subject,
            TokenRole::Access,
            config.ttl(TokenRole::Access),
            config.secret(TokenRole::Access),
            now,
        )?;
        let refresh = token::issue(
            &subject,
            TokenRole::Refresh,
            config.ttl(TokenRole::Refresh),
            config.secret(TokenRole::Refresh),
            now,
        )?;

        self.store
            .upsert_session(NewSession {
                session_id: subject.session_id,
                user_id: subject.user_id,
                client_origin: subject.client_origin,
                refresh_fingerprint: token::fingerprint(&refresh.token),
                issued_at: now,
                expires_at: refresh.expires_at,
            })
            .await?;

        info!(user_id = %identity.id, session_id = %subject.session_id, "session opened");

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_at: access.expires_at,
        })
    }

    /// Register a new identity. Does not log in.
    ///
    /// # Errors
    /// `EmailTaken` if the email is already registered.
    #[instrument(skip_all)]
    pub async fn signup(&self, email: &str, password: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        if self.store.find_identity_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let digest = self.hash_password(password).await?;
        match self.store.create_identity(&email, &digest).await? {
            CreateIdentityOutcome::Created(identity) => {
                info!(user_id = %identity.id, "identity created");
                Ok(())
            }
            // Lost a race with a concurrent signup for the same email.
            CreateIdentityOutcome::EmailTaken => Err(AuthError::EmailTaken),
        }
    }

    /// Exchange a refresh token for a new pair, rotating the stored fingerprint.
    ///
    /// # Errors
    /// - `InvalidToken` / `TokenExpired` if the token does not verify as a refresh
    ///   token or is not bound to `(user_id, client_origin)`.
    /// - `SessionNotFound` if there is no active session carrying the token's session id.
    /// - `TokenReuseDetected` if the token is a superseded one; the session is revoked.
    /// - `ConcurrentRefresh` if another refresh rotated the session first.
    #[instrument(skip_all, fields(user_id = %user_id, client_origin = %client_origin))]
    pub async fn refresh_token(
        &self,
        user_id: Uuid,
        client_origin: &str,
        raw_refresh_token: &str,
        config: &JwtConfig,
    ) -> AuthResult<TokenPair> {
        let now = self.clock.now_unix();
        let claims = token::verify(
            raw_refresh_token,
            TokenRole::Refresh,
            config.secret(TokenRole::Refresh),
            now,
        )?;
        if claims.sub != user_id || claims.origin != client_origin {
            return Err(AuthError::InvalidToken);
        }

        let session = self
            .store
            .find_session_by_key(user_id, client_origin)
            .await?
            .filter(|session| session.is_active(now))
            .ok_or(AuthError::SessionNotFound)?;

        // A token from a session that a later login replaced is dead, but it is
        // not evidence against the replacing session.
        if session.session_id != claims.sid {
            return Err(AuthError::SessionNotFound);
        }

        let presented = token::fingerprint(raw_refresh_token);
        if presented != session.refresh_fingerprint {
            warn!(session_id = %session.session_id, "refresh token reuse detected, revoking session");
            self.store
                .revoke_session_if(user_id, client_origin, session.session_id)
                .await?;
            return Err(AuthError::TokenReuseDetected);
        }

        let subject = claims.subject();
        let access = token::issue(
            &subject,
            TokenRole::Access,
            config.ttl(TokenRole::Access),
            config.secret(TokenRole::Access),
            now,
        )?;
        let refresh = token::issue(
            &subject,
            TokenRole::Refresh,
            config.ttl(TokenRole::Refresh),
            config.secret(TokenRole::Refresh),
            now,
        )?;

        let outcome = self
            .store
            .rotate_session(Rotation {
                user_id,
                client_origin: client_origin.to_string(),
                session_id: session.session_id,
                expected_fingerprint: presented,
                new_fingerprint: token::fingerprint(&refresh.token),
                issued_at: now,
                expires_at: refresh.expires_at,
            })
            .await?;

        match outcome {
            RotateOutcome::Rotated => {
                debug!(session_id = %session.session_id, "session rotated");
                Ok(TokenPair {
                    access_token: access.token,
                    refresh_token: refresh.token,
                    expires_at: access.expires_at,
                })
            }
            RotateOutcome::Stale => {
                warn!(session_id = %session.session_id, "concurrent refresh lost rotation race");
                Err(AuthError::ConcurrentRefresh)
            }
        }
    }

    /// Revoke the session for `(user_id, client_origin)`. Idempotent.
    ///
    /// # Errors
    /// `StoreUnavailable` if the store fails.
    #[instrument(skip_all, fields(user_id = %user_id, client_origin = %client_origin))]
    pub async fn logout(&self, user_id: Uuid, client_origin: &str) -> AuthResult<()> {
        let revoked = self.store.revoke_session(user_id, client_origin).await?;
        debug!(revoked, "logout");
        Ok(())
    }

    /// Revoke every session of the user across all origins.
    ///
    /// # Errors
    /// `StoreUnavailable` if the store fails.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn logout_all(&self, user_id: Uuid) -> AuthResult<u64> {
        let revoked = self.store.revoke_all_sessions_for_user(user_id).await?;
        info!(revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Replace the password and revoke every session of the user.
    ///
    /// Access tokens already issued stay valid until their own expiry.
    ///
    /// # Errors
    /// `InvalidCredentials` if the user is unknown, `old_password` is wrong, or a
    /// concurrent change replaced the digest first.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let Some(identity) = self.store.find_identity_by_id(user_id).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !self
            .verify_password(old_password, Some(identity.password_hash.clone()))
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let new_digest = self.hash_password(new_password).await?;
        match self
            .store
            .update_identity_password(user_id, &identity.password_hash, &new_digest)
            .await?
        {
            PasswordUpdate::Updated => {
                info!("password changed, sessions revoked");
                Ok(())
            }
            PasswordUpdate::Conflict => {
                warn!("password changed concurrently");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Verify an access token by signature and expiry alone.
    ///
    /// # Errors
    /// `InvalidToken` or `TokenExpired`.
    pub fn authenticate(&self, access_token: &str, config: &JwtConfig) -> AuthResult<Claims> {
        Ok(token::verify(
            access_token,
            TokenRole::Access,
            config.secret(TokenRole::Access),
            self.clock.now_unix(),
        )?)
    }

    /// Decode a refresh token's claims so the caller can address its session.
    ///
    /// # Errors
    /// `InvalidToken` or `TokenExpired`.
    pub fn refresh_claims(&self, refresh_token: &str, config: &JwtConfig) -> AuthResult<Claims> {
        Ok(token::verify(
            refresh_token,
            TokenRole::Refresh,
            config.secret(TokenRole::Refresh),
            self.clock.now_unix(),
        )?)
    }

    async fn hash_password(&self, password: &str) -> AuthResult<String> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| AuthError::Internal(format!("password hashing task failed: {err}")))?
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    /// `None` verifies against the decoy digest and always yields `false`.
    async fn verify_password(&self, password: &str, digest: Option<String>) -> AuthResult<bool> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || match digest {
            Some(digest) => hasher.verify(&password, &digest),
            None => {
                let _ = hasher.verify(&password, hasher.decoy_digest());
                false
            }
        })
        .await
        .map_err(|err| AuthError::Internal(format!("password verification task failed: {err}")))
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}
