//! Token codec: signed, expiring claim sets for access and refresh roles.
//!
//! Tokens are compact HS256 JWTs. Each role is signed with its own secret, so a
//! token minted for one role never verifies as the other even if the role claim
//! were tampered with.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use ulid::Ulid;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const ALG_HS256: &str = "HS256";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("unexpected token role")]
    WrongRole,
    #[error("failed to encode token")]
    Encode(#[source] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    Access,
    Refresh,
}

impl TokenRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG_HS256.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Identity a token is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub client_origin: String,
    pub session_id: Uuid,
}

/// Decoded claims. Every field is required; anything missing or mistyped is `Malformed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub origin: String,
    pub sid: Uuid,
    pub role: TokenRole,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    #[must_use]
    pub fn subject(&self) -> TokenSubject {
        TokenSubject {
            user_id: self.sub,
            client_origin: self.origin.clone(),
            session_id: self.sid,
        }
    }
}

/// A freshly signed token together with its absolute expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(TokenError::Encode)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

fn mac(secret: &[u8], signing_input: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidSignature)?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

/// Sign a token for `subject` with `role`, valid for `ttl_seconds` from `now`.
///
/// # Errors
///
/// Returns an error if the header or claims cannot be encoded.
pub fn issue(
    subject: &TokenSubject,
    role: TokenRole,
    ttl_seconds: i64,
    secret: &[u8],
    now_unix_seconds: i64,
) -> Result<IssuedToken, TokenError> {
    let claims = Claims {
        sub: subject.user_id,
        origin: subject.client_origin.clone(),
        sid: subject.session_id,
        role,
        iat: now_unix_seconds,
        exp: now_unix_seconds.saturating_add(ttl_seconds),
        jti: Ulid::new().to_string(),
    };

    let header_b64 = b64e_json(&TokenHeader::hs256())?;
    let claims_b64 = b64e_json(&claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signature = mac(secret, &signing_input)?.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(IssuedToken {
        token: format!("{signing_input}.{signature_b64}"),
        expires_at: claims.exp,
    })
}

/// Verify a token expected to carry `role` and return its claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is not three base64url segments with a HS256 header (`Malformed`),
/// - the signature does not match `secret` (`InvalidSignature`),
/// - the claims do not decode into [`Claims`] (`Malformed`),
/// - the role claim differs from `role` (`WrongRole`),
/// - `exp <= now` (`Expired`).
pub fn verify(
    token: &str,
    role: TokenRole,
    secret: &[u8],
    now_unix_seconds: i64,
) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
    let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
    let sig_b64 = parts.next().ok_or(TokenError::Malformed)?;
    if parts.next().is_some() {
        return Err(TokenError::Malformed);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != ALG_HS256 {
        return Err(TokenError::Malformed);
    }

    let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Malformed)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    mac(secret, &signing_input)?
        .verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let claims: Claims = b64d_json(claims_b64)?;
    if claims.role != role {
        return Err(TokenError::WrongRole);
    }
    if claims.exp <= now_unix_seconds {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

/// One-way digest of a raw token; the only form of a refresh token that is stored.
#[must_use]
pub fn fingerprint(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const ACCESS_SECRET: &[u8] = b"access-secret-access-secret-0001";
    const REFRESH_SECRET: &[u8] = b"refresh-secret-refresh-secret-01";

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: Uuid::from_u128(1),
            client_origin: "1.2.3.4".to_string(),
            session_id: Uuid::from_u128(2),
        }
    }

    #[test]
    fn issue_and_verify() -> Result<(), TokenError> {
        let issued = issue(&subject(), TokenRole::Access, 60, ACCESS_SECRET, NOW)?;
        assert_eq!(issued.expires_at, NOW + 60);

        let claims = verify(&issued.token, TokenRole::Access, ACCESS_SECRET, NOW)?;
        assert_eq!(claims.subject(), subject());
        assert_eq!(claims.role, TokenRole::Access);
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 60);
        Ok(())
    }

    #[test]
    fn expiry_is_inclusive() -> Result<(), TokenError> {
        let issued = issue(&subject(), TokenRole::Access, 60, ACCESS_SECRET, NOW)?;
        assert!(verify(&issued.token, TokenRole::Access, ACCESS_SECRET, NOW + 59).is_ok());
        assert!(matches!(
            verify(&issued.token, TokenRole::Access, ACCESS_SECRET, NOW + 60),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn access_token_never_verifies_as_refresh() -> Result<(), TokenError> {
        let issued = issue(&subject(), TokenRole::Access, 60, ACCESS_SECRET, NOW)?;

        // Same secret: the role claim is what rejects it.
        assert!(matches!(
            verify(&issued.token, TokenRole::Refresh, ACCESS_SECRET, NOW),
            Err(TokenError::WrongRole)
        ));
        // Refresh secret: the signature is what rejects it.
        assert!(matches!(
            verify(&issued.token, TokenRole::Refresh, REFRESH_SECRET, NOW),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn tampered_claims_fail_signature() -> Result<(), TokenError> {
        let issued = issue(&subject(), TokenRole::Refresh, 60, REFRESH_SECRET, NOW)?;
        let parts: Vec<&str> = issued.token.split('.').collect();
        let mut claims: Claims = b64d_json(parts[1])?;
        claims.sub = Uuid::from_u128(99);
        let forged = format!("{}.{}.{}", parts[0], b64e_json(&claims)?, parts[2]);

        assert!(matches!(
            verify(&forged, TokenRole::Refresh, REFRESH_SECRET, NOW),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() {
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(matches!(
                verify(token, TokenRole::Access, ACCESS_SECRET, NOW),
                Err(TokenError::Malformed)
            ));
        }
    }

    #[test]
    fn rejects_claims_with_missing_fields() -> Result<(), TokenError> {
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&serde_json::json!({
            "sub": Uuid::from_u128(1),
            "role": "access",
            "exp": NOW + 60,
        }))?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = mac(ACCESS_SECRET, &signing_input)?.finalize().into_bytes();
        let token = format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        );

        assert!(matches!(
            verify(&token, TokenRole::Access, ACCESS_SECRET, NOW),
            Err(TokenError::Malformed)
        ));
        Ok(())
    }

    #[test]
    fn rejects_other_algorithms() -> Result<(), TokenError> {
        let issued = issue(&subject(), TokenRole::Access, 60, ACCESS_SECRET, NOW)?;
        let rest = issued.token.split_once('.').map(|(_, rest)| rest.to_string());
        let header = b64e_json(&serde_json::json!({"alg": "none", "typ": "JWT"}))?;
        let token = format!("{header}.{}", rest.unwrap_or_default());
        assert!(matches!(
            verify(&token, TokenRole::Access, ACCESS_SECRET, NOW),
            Err(TokenError::Malformed)
        ));
        Ok(())
    }

    #[test]
    fn tokens_issued_in_the_same_second_differ() -> Result<(), TokenError> {
        let first = issue(&subject(), TokenRole::Refresh, 60, REFRESH_SECRET, NOW)?;
        let second = issue(&subject(), TokenRole::Refresh, 60, REFRESH_SECRET, NOW)?;
        assert_ne!(first.token, second.token);
        assert_ne!(fingerprint(&first.token), fingerprint(&second.token));
        Ok(())
    }

    #[test]
    fn fingerprint_is_stable_sha256() {
        let first = fingerprint("token");
        assert_eq!(first.len(), 32);
        assert_eq!(first, fingerprint("token"));
        assert_ne!(first, fingerprint("other"));
    }
}
