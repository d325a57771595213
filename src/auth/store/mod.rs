//! Credential store: durable home of identities and session records.
//!
//! The session manager owns the meaning of a session; the store only persists it.
//! Every method is a single round trip and must be linearizable per
//! `(user_id, client_origin)`. The conditional methods (`create_identity`,
//! `update_identity_password`, `rotate_session`) are the atomicity points the
//! manager relies on.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

/// One authenticated login from one client origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub client_origin: String,
    pub refresh_fingerprint: Vec<u8>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub revoked: bool,
}

impl Session {
    /// Not revoked and not past its refresh expiry.
    #[must_use]
    pub fn is_active(&self, now_unix_seconds: i64) -> bool {
        !self.revoked && self.expires_at > now_unix_seconds
    }
}

/// Values written when a login creates or supersedes the session for its key.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub client_origin: String,
    pub refresh_fingerprint: Vec<u8>,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Conditional fingerprint swap performed by a refresh.
#[derive(Clone, Debug)]
pub struct Rotation {
    pub user_id: Uuid,
    pub client_origin: String,
    pub session_id: Uuid,
    pub expected_fingerprint: Vec<u8>,
    pub new_fingerprint: Vec<u8>,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug)]
pub enum CreateIdentityOutcome {
    Created(Identity),
    EmailTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordUpdate {
    /// Digest replaced and every session of the user revoked.
    Updated,
    /// The stored digest was no longer the expected one.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    Rotated,
    /// Row missing, revoked, superseded, or carrying another fingerprint.
    Stale,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_identity_by_id(&self, user_id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Insert a new identity; email uniqueness is enforced here.
    async fn create_identity(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreateIdentityOutcome, StoreError>;

    /// Swap the digest if it still equals `expected_hash`, revoking all of the
    /// user's sessions in the same atomic step.
    async fn update_identity_password(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<PasswordUpdate, StoreError>;

    async fn find_session_by_key(
        &self,
        user_id: Uuid,
        client_origin: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// Insert or overwrite the session for `(user_id, client_origin)`, clearing `revoked`.
    async fn upsert_session(&self, session: NewSession) -> Result<(), StoreError>;

    /// Replace the fingerprint and expiry only if the row still matches the rotation's expectations.
    async fn rotate_session(&self, rotation: Rotation) -> Result<RotateOutcome, StoreError>;

    /// Mark the session revoked. Returns whether an active row was changed.
    async fn revoke_session(&self, user_id: Uuid, client_origin: &str)
        -> Result<bool, StoreError>;

    /// Mark the session revoked only while the row still carries `session_id`,
    /// so a session that replaced it is left alone.
    async fn revoke_session_if(
        &self,
        user_id: Uuid,
        client_origin: &str,
        session_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Mark every session of the user revoked. Returns how many rows changed.
    async fn revoke_all_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}
