//! Authentication core: tokens, password digests, session lifecycle.
//!
//! Nothing in here knows about HTTP. The [`api`](crate::api) module talks to
//! [`Auth`], which forwards to the [`SessionManager`].

pub mod clock;
pub mod config;
pub mod error;
pub mod facade;
pub mod password;
pub mod session;
pub mod store;
pub mod token;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::config::JwtConfig;
pub use self::error::{AuthError, AuthResult};
pub use self::facade::Auth;
pub use self::password::{Argon2Hasher, PasswordHasher};
pub use self::session::{SessionManager, TokenPair};
pub use self::store::{CredentialStore, MemoryStore, PgStore};
pub use self::token::{Claims, TokenRole};
