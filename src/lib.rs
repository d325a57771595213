//! # Tokenward
//!
//! `tokenward` issues, verifies, rotates and revokes paired access/refresh
//! credentials bound to a user identity and the client network origin.
//!
//! ## Tokens
//!
//! - **Access tokens** are short-lived and stateless; a valid signature and an
//!   unexpired `exp` are enough to trust them.
//! - **Refresh tokens** are long-lived and stateful. Each one is only valid while
//!   its SHA-256 fingerprint matches the one stored on the session row. Every
//!   successful refresh rotates the fingerprint, so a refresh token can be used
//!   exactly once. Presenting a superseded token revokes the session.
//!
//! Access and refresh tokens are signed with independent secrets.
//!
//! ## Sessions
//!
//! At most one active session exists per `(user, client origin)`. Logging in again
//! from the same origin overwrites the previous session. Changing the password
//! revokes every session of the user.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
