//! In-process credential store for tests and local development.
//!
//! A single mutex guards all maps and is held for the whole body of each method,
//! which makes every method one linearizable step.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CreateIdentityOutcome, CredentialStore, Identity, NewSession, PasswordUpdate, RotateOutcome,
    Rotation, Session, StoreError,
};

#[derive(Default)]
struct Inner {
    identities: HashMap<Uuid, Identity>,
    by_email: HashMap<String, Uuid>,
    sessions: HashMap<(Uuid, String), Session>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a backend error, to exercise outage handling.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of session rows, revoked ones included.
    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        self.check()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.identities.get(id))
            .cloned())
    }

    async fn find_identity_by_id(&self, user_id: Uuid) -> Result<Option<Identity>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().await.identities.get(&user_id).cloned())
    }

    async fn create_identity(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreateIdentityOutcome, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        if inner.by_email.contains_key(email) {
            return Ok(CreateIdentityOutcome::EmailTaken);
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        };
        inner.by_email.insert(identity.email.clone(), identity.id);
        inner.identities.insert(identity.id, identity.clone());
        Ok(CreateIdentityOutcome::Created(identity))
    }

    async fn update_identity_password(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<PasswordUpdate, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let Some(identity) = inner.identities.get_mut(&user_id) else {
            return Ok(PasswordUpdate::Conflict);
        };
        if identity.password_hash != expected_hash {
            return Ok(PasswordUpdate::Conflict);
        }
        identity.password_hash = new_hash.to_string();
        for session in inner
            .sessions
            .values_mut()
            .filter(|session| session.user_id == user_id)
        {
            session.revoked = true;
        }
        Ok(PasswordUpdate::Updated)
    }

    async fn find_session_by_key(
        &self,
        user_id: Uuid,
        client_origin: &str,
    ) -> Result<Option<Session>, StoreError> {
        self.check()?;
        Ok(self
            .inner
            .lock()
            .await
            .sessions
            .get(&(user_id, client_origin.to_string()))
            .cloned())
    }

    async fn upsert_session(&self, session: NewSession) -> Result<(), StoreError> {
        self.check()?;
        let key = (session.user_id, session.client_origin.clone());
        let record = Session {
            session_id: session.session_id,
            user_id: session.user_id,
            client_origin: session.client_origin,
            refresh_fingerprint: session.refresh_fingerprint,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            revoked: false,
        };
        self.inner.lock().await.sessions.insert(key, record);
        Ok(())
    }

    async fn rotate_session(&self, rotation: Rotation) -> Result<RotateOutcome, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let key = (rotation.user_id, rotation.client_origin);
        let Some(session) = inner.sessions.get_mut(&key) else {
            return Ok(RotateOutcome::Stale);
        };
        if session.revoked
            || session.session_id != rotation.session_id
            || session.refresh_fingerprint != rotation.expected_fingerprint
        {
            return Ok(RotateOutcome::Stale);
        }
        session.refresh_fingerprint = rotation.new_fingerprint;
        session.issued_at = rotation.issued_at;
        session.expires_at = rotation.expires_at;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_session(
        &self,
        user_id: Uuid,
        client_origin: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(&(user_id, client_origin.to_string())) {
            Some(session) if !session.revoked => {
                session.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_session_if(
        &self,
        user_id: Uuid,
        client_origin: &str,
        session_id: Uuid,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(&(user_id, client_origin.to_string())) {
            Some(session) if !session.revoked && session.session_id == session_id => {
                session.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().await;
        let mut revoked = 0;
        for session in inner
            .sessions
            .values_mut()
            .filter(|session| session.user_id == user_id && !session.revoked)
        {
            session.revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};

    fn new_session(user_id: Uuid, origin: &str, fingerprint: &[u8]) -> NewSession {
        NewSession {
            session_id: Uuid::new_v4(),
            user_id,
            client_origin: origin.to_string(),
            refresh_fingerprint: fingerprint.to_vec(),
            issued_at: 10,
            expires_at: 100,
        }
    }

    async fn identity(store: &MemoryStore, email: &str) -> Result<Identity> {
        match store.create_identity(email, "digest").await? {
            CreateIdentityOutcome::Created(identity) => Ok(identity),
            CreateIdentityOutcome::EmailTaken => Err(anyhow!("email taken")),
        }
    }

    #[tokio::test]
    async fn create_identity_enforces_unique_email() -> Result<()> {
        let store = MemoryStore::new();
        let created = identity(&store, "a@x.com").await?;
        assert!(matches!(
            store.create_identity("a@x.com", "other").await?,
            CreateIdentityOutcome::EmailTaken
        ));
        assert_eq!(
            store.find_identity_by_email("a@x.com").await?,
            Some(created.clone())
        );
        assert_eq!(store.find_identity_by_id(created.id).await?, Some(created));
        Ok(())
    }

    #[tokio::test]
    async fn upsert_overwrites_the_key() -> Result<()> {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.upsert_session(new_session(user, "1.2.3.4", b"one")).await?;
        store.revoke_session(user, "1.2.3.4").await?;
        let second = new_session(user, "1.2.3.4", b"two");
        let second_id = second.session_id;
        store.upsert_session(second).await?;

        assert_eq!(store.session_count().await, 1);
        let session = store
            .find_session_by_key(user, "1.2.3.4")
            .await?
            .ok_or_else(|| anyhow!("missing session"))?;
        assert_eq!(session.session_id, second_id);
        assert_eq!(session.refresh_fingerprint, b"two");
        assert!(!session.revoked);
        Ok(())
    }

    #[tokio::test]
    async fn rotate_requires_matching_fingerprint() -> Result<()> {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let session = new_session(user, "1.2.3.4", b"one");
        let session_id = session.session_id;
        store.upsert_session(session).await?;

        let rotation = |expected: &[u8], new: &[u8]| Rotation {
            user_id: user,
            client_origin: "1.2.3.4".to_string(),
            session_id,
            expected_fingerprint: expected.to_vec(),
            new_fingerprint: new.to_vec(),
            issued_at: 20,
            expires_at: 200,
        };

        assert_eq!(
            store.rotate_session(rotation(b"one", b"two")).await?,
            RotateOutcome::Rotated
        );
        assert_eq!(
            store.rotate_session(rotation(b"one", b"three")).await?,
            RotateOutcome::Stale
        );
        let stored = store.find_session_by_key(user, "1.2.3.4").await?;
        assert_eq!(
            stored.map(|s| (s.refresh_fingerprint, s.expires_at)),
            Some((b"two".to_vec(), 200))
        );

        store.revoke_session(user, "1.2.3.4").await?;
        assert_eq!(
            store.rotate_session(rotation(b"two", b"four")).await?,
            RotateOutcome::Stale
        );
        Ok(())
    }

    #[tokio::test]
    async fn revoke_is_idempotent() -> Result<()> {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        assert!(!store.revoke_session(user, "1.2.3.4").await?);
        store.upsert_session(new_session(user, "1.2.3.4", b"one")).await?;
        assert!(store.revoke_session(user, "1.2.3.4").await?);
        assert!(!store.revoke_session(user, "1.2.3.4").await?);
        Ok(())
    }

    #[tokio::test]
    async fn conditional_revoke_spares_a_replacing_session() -> Result<()> {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = new_session(user, "1.2.3.4", b"one");
        let first_id = first.session_id;
        store.upsert_session(first).await?;
        let second = new_session(user, "1.2.3.4", b"two");
        let second_id = second.session_id;
        store.upsert_session(second).await?;

        assert!(!store.revoke_session_if(user, "1.2.3.4", first_id).await?);
        let session = store.find_session_by_key(user, "1.2.3.4").await?;
        assert_eq!(session.map(|s| s.revoked), Some(false));

        assert!(store.revoke_session_if(user, "1.2.3.4", second_id).await?);
        assert!(!store.revoke_session_if(user, "1.2.3.4", second_id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn password_update_is_compare_and_swap() -> Result<()> {
        let store = MemoryStore::new();
        let created = identity(&store, "a@x.com").await?;
        store
            .upsert_session(new_session(created.id, "1.1.1.1", b"a"))
            .await?;
        store
            .upsert_session(new_session(created.id, "2.2.2.2", b"b"))
            .await?;

        assert_eq!(
            store
                .update_identity_password(created.id, "wrong", "new")
                .await?,
            PasswordUpdate::Conflict
        );
        assert_eq!(
            store
                .update_identity_password(created.id, "digest", "new")
                .await?,
            PasswordUpdate::Updated
        );
        for origin in ["1.1.1.1", "2.2.2.2"] {
            let session = store.find_session_by_key(created.id, origin).await?;
            assert_eq!(session.map(|s| s.revoked), Some(true));
        }
        assert_eq!(store.revoke_all_sessions_for_user(created.id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.ping().await.is_err());
        assert!(store.find_identity_by_email("a@x.com").await.is_err());
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
