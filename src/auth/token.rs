//! HS256 session tokens.
//!
//! Wire form is the usual compact JWT: `base64url(header).base64url(claims).base64url(tag)`
//! with the tag computed by HMAC-SHA256 over the first two segments. The tag is
//! checked against the raw text before either segment is decoded, so nothing
//! inside the token (expiry included) is trusted until the signature holds.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use super::{account::Role, utils::now_unix_seconds};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl SessionTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Account email.
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("signing key must not be empty")]
    EmptyKey,
    #[error("signing key rejected by hmac")]
    InvalidKey,
    #[error("failed to encode token: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Identity recovered from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub role: Role,
    pub expires_at: i64,
}

/// Issues and validates session tokens under one process-wide secret.
pub struct TokenIssuer {
    key: SecretString,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// # Errors
    /// Returns `TokenError::EmptyKey` when the secret is empty.
    pub fn new(key: SecretString, ttl: Duration) -> Result<Self, TokenError> {
        if key.expose_secret().is_empty() {
            return Err(TokenError::EmptyKey);
        }
        Ok(Self { key, ttl })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        <HmacSha256 as Mac>::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|_| TokenError::InvalidKey)
    }

    /// Issue a token for `email` valid for the configured TTL.
    ///
    /// # Errors
    /// Returns `TokenError::Encode` if the header or claims cannot be serialized.
    pub fn issue(&self, email: &str, role: Role) -> Result<String, TokenError> {
        self.issue_at(email, role, now_unix_seconds())
    }

    /// Issue a token as if the current time were `now_unix_seconds`.
    ///
    /// # Errors
    /// Returns `TokenError::Encode` if the header or claims cannot be serialized.
    pub fn issue_at(
        &self,
        email: &str,
        role: Role,
        now_unix_seconds: i64,
    ) -> Result<String, TokenError> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            sub: email.to_string(),
            role,
            iat: now_unix_seconds,
            exp: now_unix_seconds.saturating_add(ttl),
        };
        let header_b64 = b64e_json(&SessionTokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let tag = mac.finalize().into_bytes();

        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&tag)
        ))
    }

    /// Validate a token against the current time.
    ///
    /// # Errors
    /// See [`TokenIssuer::validate_at`].
    pub fn validate(&self, token: &str) -> Result<VerifiedIdentity, TokenError> {
        self.validate_at(token, now_unix_seconds())
    }

    /// Validate a token as if the current time were `now_unix_seconds`.
    ///
    /// # Errors
    /// - `TokenError::Malformed` if the token is not three base64url segments
    ///   with JSON header/claims, or the header is not HS256,
    /// - `TokenError::SignatureInvalid` if the tag does not match,
    /// - `TokenError::Expired` if `now_unix_seconds >= exp`.
    pub fn validate_at(
        &self,
        token: &str,
        now_unix_seconds: i64,
    ) -> Result<VerifiedIdentity, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let tag_b64 = parts.next().ok_or(TokenError::Malformed)?;
        if parts.next().is_some() || header_b64.is_empty() || claims_b64.is_empty() {
            return Err(TokenError::Malformed);
        }

        let tag = Base64UrlUnpadded::decode_vec(tag_b64).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| TokenError::SignatureInvalid)?;

        let header: SessionTokenHeader = b64d_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if now_unix_seconds >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedIdentity {
            email: claims.sub,
            role: claims.role,
            expires_at: claims.exp,
        })
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn issuer() -> Result<TokenIssuer, TokenError> {
        TokenIssuer::new(
            SecretString::from("test-secret-key".to_string()),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn issue_and_validate() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let token = issuer.issue_at("a@x.com", Role::User, NOW)?;
        assert_eq!(token.split('.').count(), 3);

        let identity = issuer.validate_at(&token, NOW + 10)?;
        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.expires_at, NOW + 3600);
        Ok(())
    }

    #[test]
    fn expired_token_rejected_even_with_valid_signature() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let token = issuer.issue_at("a@x.com", Role::Admin, NOW)?;
        assert!(matches!(
            issuer.validate_at(&token, NOW + 3600),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            issuer.validate_at(&token, NOW + 9999),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn tampered_payload_rejected() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let token = issuer.issue_at("a@x.com", Role::User, NOW)?;
        let parts: Vec<&str> = token.split('.').collect();

        let mut claims = parts[1].as_bytes().to_vec();
        claims[5] = if claims[5] == b'A' { b'B' } else { b'A' };
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            String::from_utf8_lossy(&claims),
            parts[2]
        );
        assert!(matches!(
            issuer.validate_at(&tampered, NOW),
            Err(TokenError::SignatureInvalid)
        ));
        Ok(())
    }

    #[test]
    fn forged_role_and_expiry_rejected() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let token = issuer.issue_at("a@x.com", Role::User, NOW)?;
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = SessionClaims {
            sub: "a@x.com".to_string(),
            role: Role::Admin,
            iat: NOW,
            exp: NOW + 999_999,
        };
        let forged = format!("{}.{}.{}", parts[0], b64e_json(&forged_claims)?, parts[2]);
        assert!(matches!(
            issuer.validate_at(&forged, NOW + 5000),
            Err(TokenError::SignatureInvalid)
        ));
        Ok(())
    }

    #[test]
    fn other_key_rejected() -> Result<(), TokenError> {
        let token = issuer()?.issue_at("a@x.com", Role::User, NOW)?;
        let other = TokenIssuer::new(
            SecretString::from("other".to_string()),
            Duration::from_secs(60),
        )?;
        assert!(matches!(
            other.validate_at(&token, NOW),
            Err(TokenError::SignatureInvalid)
        ));
        Ok(())
    }

    #[test]
    fn malformed_tokens() -> Result<(), TokenError> {
        let issuer = issuer()?;
        for token in ["", "abc", "a.b", "a.b.c.d", "..", "a.b.!!!"] {
            assert!(
                matches!(issuer.validate_at(token, NOW), Err(TokenError::Malformed)),
                "{token}"
            );
        }
        Ok(())
    }

    #[test]
    fn signed_garbage_is_malformed() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let header = Base64UrlUnpadded::encode_string(b"not json");
        let claims = Base64UrlUnpadded::encode_string(b"{}");
        let signing_input = format!("{header}.{claims}");
        let mut mac = issuer.mac()?;
        mac.update(signing_input.as_bytes());
        let tag = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        assert!(matches!(
            issuer.validate_at(&format!("{signing_input}.{tag}"), NOW),
            Err(TokenError::Malformed)
        ));
        Ok(())
    }

    #[test]
    fn empty_key_rejected() {
        assert!(matches!(
            TokenIssuer::new(SecretString::from(String::new()), DEFAULT_TOKEN_TTL),
            Err(TokenError::EmptyKey)
        ));
    }
}
