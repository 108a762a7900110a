//! Redis service for revoked session tokens

use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let service = Self { client };
        service.ping().await?;
        Ok(service)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    /// Connection test
    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;
        Ok(())
    }

    /// Deny a token id until it would have expired anyway
    pub async fn revoke_token(&self, jti: &str, ttl_seconds: u64) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(revoked_key(jti), "1", ttl_seconds)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to revoke token in Redis: {}", e)))?;
        Ok(())
    }

    /// Check whether a token id was revoked
    pub async fn is_revoked(&self, jti: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn
            .exists(revoked_key(jti))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to check token in Redis: {}", e)))?;
        Ok(exists)
    }
}

fn revoked_key(jti: &str) -> String {
    format!("revoked_token:{}", jti)
}
