//! Password hashing and verification.
//!
//! Digests are Argon2id PHC strings. An optional server-side pepper is mixed in
//! through the Argon2 secret parameter, so a leaked database alone is not enough
//! to mount an offline attack.

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 1024;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to initialize Argon2id")]
    Init,
    #[error("failed to hash password")]
    Hash,
}

/// One-way hash plus verification.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password into a self-describing digest.
    ///
    /// # Errors
    /// Returns an error if the underlying primitive fails.
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// Compare a plaintext password with a stored digest. Malformed digests never match.
    fn verify(&self, password: &str, digest: &str) -> bool;

    /// A valid digest of no real password, verified against when an email is unknown
    /// so both login failure paths do the same work.
    fn decoy_digest(&self) -> &str;
}

/// Check length bounds on a candidate password.
///
/// # Errors
/// Returns the reason the password is rejected.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        ));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} bytes"
        ));
    }
    Ok(())
}

pub struct Argon2Hasher {
    pepper: Option<SecretString>,
    decoy: String,
}

impl Argon2Hasher {
    /// # Errors
    /// Returns an error if Argon2id cannot be initialized with the pepper.
    pub fn new(pepper: Option<SecretString>) -> Result<Self, PasswordError> {
        let mut hasher = Self {
            pepper,
            decoy: String::new(),
        };
        hasher.decoy = hasher.hash(&ulid::Ulid::new().to_string())?;
        Ok(hasher)
    }

    fn argon2(&self) -> Result<Argon2<'_>, PasswordError> {
        match &self.pepper {
            Some(pepper) => Argon2::new_with_secret(
                pepper.expose_secret().as_bytes(),
                argon2::Algorithm::Argon2id,
                argon2::Version::V0x13,
                argon2::Params::default(),
            )
            .map_err(|_| PasswordError::Init),
            None => Ok(Argon2::default()),
        }
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| PasswordError::Hash)?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        let Ok(argon2) = self.argon2() else {
            return false;
        };
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    }

    fn decoy_digest(&self) -> &str {
        &self.decoy
    }
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher")
            .field("pepper", &self.pepper.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hasher = Argon2Hasher::new(None).unwrap();
        let digest = hasher.hash("pw123456").unwrap();
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("pw123456", &digest));
        assert!(!hasher.verify("pw1234567", &digest));
    }

    #[test]
    fn pepper_is_required_to_verify() {
        let peppered = Argon2Hasher::new(Some(SecretString::from("pepper".to_string()))).unwrap();
        let plain = Argon2Hasher::new(None).unwrap();
        let digest = peppered.hash("pw123456").unwrap();
        assert!(peppered.verify("pw123456", &digest));
        assert!(!plain.verify("pw123456", &digest));
    }

    #[test]
    fn malformed_digest_never_matches() {
        let hasher = Argon2Hasher::new(None).unwrap();
        assert!(!hasher.verify("pw123456", "not-a-phc-string"));
        assert!(!hasher.verify("", ""));
    }

    #[test]
    fn decoy_digest_is_a_valid_phc_string() {
        let hasher = Argon2Hasher::new(None).unwrap();
        assert!(PasswordHash::new(hasher.decoy_digest()).is_ok());
        assert!(!hasher.verify("pw123456", hasher.decoy_digest()));
    }

    #[test]
    fn validate_password_bounds() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }
}
