//! Administrator authentication: password check, session tokens and revocation

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        activity::{NewActivity, RequestMeta},
        admin::{token_fingerprint, AdminClaims, ADMIN_PASSWORD_KEY},
    },
    repository::Repository,
};

use super::redis::RedisService;

/// Subject of admin session tokens
pub const ADMIN_SUBJECT: &str = "admin";

/// Issued session token
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
    redis: RedisService,
}

/// Hash a password into an Argon2 PHC string
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against an Argon2 PHC string
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig, redis: RedisService) -> Self {
        Self {
            repository,
            config,
            redis,
        }
    }

    /// Provision the admin password from configuration when none is stored
    pub async fn bootstrap(&self) -> AppResult<()> {
        let Some(ref password) = self.config.bootstrap_password else {
            if self.repository.admin_secrets.get_hash(ADMIN_PASSWORD_KEY).await?.is_none() {
                tracing::warn!("No admin password provisioned; set auth.bootstrap_password");
            }
            return Ok(());
        };

        let hash = hash_password(password)?;
        if self
            .repository
            .admin_secrets
            .insert_if_absent(ADMIN_PASSWORD_KEY, &hash)
            .await?
        {
            tracing::info!("Admin password provisioned from configuration");
        }
        Ok(())
    }

    /// Check the admin password and issue a session token
    pub async fn login(&self, password: &str, meta: &RequestMeta) -> AppResult<AdminSession> {
        let stored = self
            .repository
            .admin_secrets
            .get_hash(ADMIN_PASSWORD_KEY)
            .await?
            .ok_or_else(|| AppError::Internal("Admin password is not provisioned".to_string()))?;

        if !verify_password(password, &stored)? {
            tracing::warn!(ip = ?meta.ip_address, "Failed admin login attempt");
            let entry = NewActivity::new(
                ADMIN_SUBJECT,
                "Failed admin login attempt",
                json!({ "ip_address": meta.ip_address, "user_agent": meta.user_agent }),
            )
            .meta(meta);
            if let Err(e) = self.repository.activity.log(&entry).await {
                tracing::error!(error = %e, "Failed to record login attempt");
            }
            return Err(AppError::Authentication("Invalid password".to_string()));
        }

        let claims = AdminClaims::new(ADMIN_SUBJECT, self.config.jwt_expiration_hours);
        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

        let entry = NewActivity::new(
            ADMIN_SUBJECT,
            "Admin login successful",
            json!({
                "token_fingerprint": token_fingerprint(&token),
                "expires_at": expires_at,
            }),
        )
        .meta(meta);
        self.repository.activity.log(&entry).await?;

        tracing::info!(ip = ?meta.ip_address, "Admin logged in");
        Ok(AdminSession { token, expires_at })
    }

    /// Verify a bearer token: signature, expiry and revocation
    pub async fn verify(&self, token: &str) -> AppResult<AdminClaims> {
        let claims = AdminClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))?;

        if self.redis.is_revoked(&claims.jti).await? {
            return Err(AppError::Authentication("Token has been revoked".to_string()));
        }
        Ok(claims)
    }

    /// Revoke a session token until its natural expiry
    pub async fn logout(&self, claims: &AdminClaims, meta: &RequestMeta) -> AppResult<()> {
        self.redis
            .revoke_token(&claims.jti, claims.remaining_seconds())
            .await?;

        let entry = NewActivity::new(claims.sub.as_str(), "Admin logout", json!({ "jti": claims.jti }))
            .meta(meta);
        self.repository.activity.log(&entry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret-pass", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_invalid_stored_hash_is_an_error() {
        assert!(verify_password("x", "plaintext").is_err());
    }
}
