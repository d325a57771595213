//! Postgres credential store.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    CreateIdentityOutcome, CredentialStore, Identity, NewSession, PasswordUpdate, RotateOutcome,
    Rotation, Session, StoreError,
};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn identity_from_row(row: &PgRow) -> Identity {
    Identity {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        client_origin: row.get("client_origin"),
        refresh_fingerprint: row.get("refresh_fingerprint"),
        issued_at: row.get("issued_at"),
        expires_at: row.get("expires_at"),
        revoked: row.get("revoked"),
    }
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply `sql/schema.sql`. Every statement is idempotent.
    ///
    /// # Errors
    /// Returns an error if any statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let script = SCHEMA_SQL
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        for statement in script
            .split(';')
            .map(str::trim)
            .filter(|statement| !statement.is_empty())
        {
            sqlx::query(statement)
                .execute(&self.pool)
                .instrument(db_span("MIGRATE", "sql/schema.sql"))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let query = "SELECT id, email, password_hash FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn find_identity_by_id(&self, user_id: Uuid) -> Result<Option<Identity>, StoreError> {
        let query = "SELECT id, email, password_hash FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn create_identity(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreateIdentityOutcome, StoreError> {
        let query = r"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash
        ";
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(CreateIdentityOutcome::Created(identity_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(CreateIdentityOutcome::EmailTaken),
            Err(err) => Err(err.into()),
        }
    }

    async fn update_identity_password(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<PasswordUpdate, StoreError> {
        // Digest swap and session revocation commit together or not at all.
        let mut tx = self.pool.begin().await?;

        let query = r"
            UPDATE users
            SET password_hash = $3, updated_at = NOW()
            WHERE id = $1 AND password_hash = $2
        ";
        let updated = sqlx::query(query)
            .bind(user_id)
            .bind(expected_hash)
            .bind(new_hash)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await?
            .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(PasswordUpdate::Conflict);
        }

        let query = "UPDATE user_sessions SET revoked = TRUE WHERE user_id = $1 AND NOT revoked";
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await?;

        tx.commit().await?;
        Ok(PasswordUpdate::Updated)
    }

    async fn find_session_by_key(
        &self,
        user_id: Uuid,
        client_origin: &str,
    ) -> Result<Option<Session>, StoreError> {
        let query = r"
            SELECT session_id, user_id, client_origin, refresh_fingerprint,
                   issued_at, expires_at, revoked
            FROM user_sessions
            WHERE user_id = $1 AND client_origin = $2
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(client_origin)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn upsert_session(&self, session: NewSession) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO user_sessions
                (session_id, user_id, client_origin, refresh_fingerprint, issued_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            ON CONFLICT (user_id, client_origin) DO UPDATE
            SET session_id = EXCLUDED.session_id,
                refresh_fingerprint = EXCLUDED.refresh_fingerprint,
                issued_at = EXCLUDED.issued_at,
                expires_at = EXCLUDED.expires_at,
                revoked = FALSE
        ";
        sqlx::query(query)
            .bind(session.session_id)
            .bind(session.user_id)
            .bind(session.client_origin)
            .bind(session.refresh_fingerprint)
            .bind(session.issued_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn rotate_session(&self, rotation: Rotation) -> Result<RotateOutcome, StoreError> {
        // The fingerprint predicate is the compare half of the compare-and-swap.
        let query = r"
            UPDATE user_sessions
            SET refresh_fingerprint = $5, issued_at = $6, expires_at = $7
            WHERE user_id = $1
              AND client_origin = $2
              AND session_id = $3
              AND refresh_fingerprint = $4
              AND NOT revoked
        ";
        let updated = sqlx::query(query)
            .bind(rotation.user_id)
            .bind(rotation.client_origin)
            .bind(rotation.session_id)
            .bind(rotation.expected_fingerprint)
            .bind(rotation.new_fingerprint)
            .bind(rotation.issued_at)
            .bind(rotation.expires_at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?
            .rows_affected();

        Ok(if updated == 1 {
            RotateOutcome::Rotated
        } else {
            RotateOutcome::Stale
        })
    }

    async fn revoke_session(
        &self,
        user_id: Uuid,
        client_origin: &str,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE user_sessions
            SET revoked = TRUE
            WHERE user_id = $1 AND client_origin = $2 AND NOT revoked
        ";
        let updated = sqlx::query(query)
            .bind(user_id)
            .bind(client_origin)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn revoke_session_if(
        &self,
        user_id: Uuid,
        client_origin: &str,
        session_id: Uuid,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE user_sessions
            SET revoked = TRUE
            WHERE user_id = $1 AND client_origin = $2 AND session_id = $3 AND NOT revoked
        ";
        let updated = sqlx::query(query)
            .bind(user_id)
            .bind(client_origin)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn revoke_all_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let query = "UPDATE user_sessions SET revoked = TRUE WHERE user_id = $1 AND NOT revoked";
        let updated = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?
            .rows_affected();
        Ok(updated)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
