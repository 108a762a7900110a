//! Administrator secrets (password hashes)

use sqlx::{Pool, Postgres};

use crate::error::AppResult;

#[derive(Clone)]
pub struct AdminSecretsRepository {
    pool: Pool<Postgres>,
}

impl AdminSecretsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get the stored hash for a key
    pub async fn get_hash(&self, key: &str) -> AppResult<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>("SELECT value_hash FROM admin_secrets WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    /// Store a hash unless the key is already provisioned. Returns true when inserted.
    pub async fn insert_if_absent(&self, key: &str, value_hash: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO admin_secrets (key, value_hash)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
