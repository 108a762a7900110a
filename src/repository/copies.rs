//! Copies repository

use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::copy::{generate_barcode, BookCopy, CopyStatus},
};

#[derive(Clone)]
pub struct CopiesRepository {
    pool: Pool<Postgres>,
}

/// Insert one available copy with a fresh barcode
pub async fn insert_available(conn: &mut PgConnection, book_id: Uuid) -> AppResult<BookCopy> {
    let copy = sqlx::query_as::<_, BookCopy>(
        r#"
        INSERT INTO copies (book_id, barcode, status)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(book_id)
    .bind(generate_barcode())
    .bind(CopyStatus::Available)
    .fetch_one(conn)
    .await?;
    Ok(copy)
}

/// Atomically claim one available copy of a book.
///
/// The sub-select locks the candidate row and skips rows locked by a
/// concurrent approval; the outer `status = 'available'` guard makes the
/// update a compare-and-set. Returns `None` when no copy could be claimed.
pub async fn claim_available(conn: &mut PgConnection, book_id: Uuid) -> AppResult<Option<Uuid>> {
    let claimed = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE copies SET status = $2, updated_at = NOW()
        WHERE id = (
            SELECT id FROM copies
            WHERE book_id = $1 AND status = $3
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND status = $3
        RETURNING id
        "#,
    )
    .bind(book_id)
    .bind(CopyStatus::Borrowed)
    .bind(CopyStatus::Available)
    .fetch_optional(conn)
    .await?;
    Ok(claimed)
}

/// Set the status of a copy
pub async fn set_status(conn: &mut PgConnection, copy_id: Uuid, status: CopyStatus) -> AppResult<()> {
    let result = sqlx::query("UPDATE copies SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(status)
        .bind(copy_id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Copy with id {} not found", copy_id)));
    }
    Ok(())
}

impl CopiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Add one copy to an existing book
    pub async fn add_copy(&self, book_id: Uuid) -> AppResult<BookCopy> {
        let mut conn = self.pool.acquire().await?;
        insert_available(&mut conn, book_id).await
    }
}
