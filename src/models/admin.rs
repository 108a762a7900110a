//! Administrator session token

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Key of the admin password hash in `admin_secrets`
pub const ADMIN_PASSWORD_KEY: &str = "admin_password";

/// Claims of a signed admin session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    /// Token id, used for revocation on logout
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

impl AdminClaims {
    pub fn new(sub: impl Into<String>, ttl_hours: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: sub.into(),
            jti: Uuid::new_v4().to_string(),
            exp: now + (ttl_hours as i64 * 3600),
            iat: now,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a JWT token (signature and expiry)
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Seconds left before expiry, never negative
    pub fn remaining_seconds(&self) -> u64 {
        (self.exp - Utc::now().timestamp()).max(0) as u64
    }
}

/// Short SHA-256 fingerprint of a token, safe to write to the audit log
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let claims = AdminClaims::new("admin", 8);
        let token = claims.create_token(SECRET).unwrap();
        let parsed = AdminClaims::from_token(&token, SECRET).unwrap();
        assert_eq!(parsed, claims);
        assert!(parsed.remaining_seconds() > 7 * 3600);
    }

    #[test]
    fn test_token_with_wrong_secret_is_rejected() {
        let token = AdminClaims::new("admin", 8).create_token(SECRET).unwrap();
        assert!(AdminClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let mut claims = AdminClaims::new("admin", 8);
        claims.iat -= 10 * 3600;
        claims.exp = Utc::now().timestamp() - 3600;
        let token = claims.create_token(SECRET).unwrap();
        assert!(AdminClaims::from_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_opaque_string_is_rejected() {
        assert!(AdminClaims::from_token("admin_1700000000_abc123", SECRET).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let fp = token_fingerprint("abc");
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, token_fingerprint("abc"));
        assert_ne!(fp, token_fingerprint("abd"));
    }
}
