//! Outbound notification queue

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::notification::{EmailMessage, NotificationQuery, NotificationStatus, QueuedNotification},
};

use super::paginate;

#[derive(Clone)]
pub struct NotificationsRepository {
    pool: Pool<Postgres>,
}

/// Queue an email inside an open transaction
pub async fn enqueue(
    conn: &mut PgConnection,
    message: &EmailMessage,
    payload: serde_json::Value,
) -> AppResult<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO notifications_queue (notification_type, to_email, subject, content, payload, status)
        VALUES ('email', $1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&message.to)
    .bind(&message.subject)
    .bind(message.html.clone().unwrap_or_else(|| message.text_body()))
    .bind(payload)
    .bind(NotificationStatus::Queued)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

impl NotificationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get a queued notification by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<QueuedNotification> {
        sqlx::query_as::<_, QueuedNotification>("SELECT * FROM notifications_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification with id {} not found", id)))
    }

    /// List queue entries, newest first
    pub async fn list(&self, query: &NotificationQuery) -> AppResult<(Vec<QueuedNotification>, i64)> {
        let (limit, offset) = paginate(query.page, query.per_page, 50);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications_queue WHERE TRUE");
        if let Some(status) = query.status {
            count.push(" AND status = ").push_bind(status);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM notifications_queue WHERE TRUE");
        if let Some(status) = query.status {
            select.push(" AND status = ").push_bind(status);
        }
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let entries = select
            .build_query_as::<QueuedNotification>()
            .fetch_all(&self.pool)
            .await?;

        Ok((entries, total))
    }

    /// Claim one queued entry for delivery.
    ///
    /// Only a `queued` entry can be claimed; anything else is a conflict.
    pub async fn claim(&self, id: Uuid) -> AppResult<QueuedNotification> {
        let claimed = sqlx::query_as::<_, QueuedNotification>(
            r#"
            UPDATE notifications_queue
            SET status = $2, processed_at = NOW()
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(NotificationStatus::Sending)
        .bind(NotificationStatus::Queued)
        .fetch_optional(&self.pool)
        .await?;

        match claimed {
            Some(entry) => Ok(entry),
            None => {
                let existing = self.get_by_id(id).await?;
                Err(AppError::Conflict(existing.status.claim_conflict().to_string()))
            }
        }
    }

    /// Claim a batch of queued entries that still have attempts left, oldest first.
    /// Entries stuck in `sending` past `stale_after_secs` are reclaimed.
    pub async fn claim_batch(
        &self,
        max_attempts: i32,
        limit: i64,
        stale_after_secs: i64,
    ) -> AppResult<Vec<QueuedNotification>> {
        let entries = sqlx::query_as::<_, QueuedNotification>(
            r#"
            UPDATE notifications_queue
            SET status = $1, processed_at = NOW()
            WHERE id IN (
                SELECT id FROM notifications_queue
                WHERE attempts < $3
                  AND (status = $2
                       OR (status = $1 AND processed_at < NOW() - make_interval(secs => $5)))
                ORDER BY created_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(NotificationStatus::Sending)
        .bind(NotificationStatus::Queued)
        .bind(max_attempts)
        .bind(limit)
        .bind(stale_after_secs as f64)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Mark an entry as delivered
    pub async fn mark_sent(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE notifications_queue
            SET status = $1, attempts = attempts + 1, processed_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(NotificationStatus::Sent)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt; the entry returns to the queue until attempts run out
    pub async fn mark_failed(&self, id: Uuid, max_attempts: i32) -> AppResult<NotificationStatus> {
        let status = sqlx::query_scalar::<_, NotificationStatus>(
            r#"
            UPDATE notifications_queue
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= $2 THEN $3 ELSE $4 END,
                processed_at = NOW()
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .bind(NotificationStatus::Failed)
        .bind(NotificationStatus::Queued)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Notification with id {} not found", id)))?;
        Ok(status)
    }
}
