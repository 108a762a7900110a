//! Dashboard statistics service

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::{error::AppResult, repository::Repository};

/// Counts shown on the admin dashboard
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct DashboardStats {
    pub total_books: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub borrowed_copies: i64,
    pub pending_requests: i64,
    pub active_loans: i64,
    pub overdue_loans: i64,
    /// Late fees on loans not yet returned
    #[schema(value_type = String)]
    pub outstanding_fees: Decimal,
    pub queued_notifications: i64,
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get dashboard statistics in a single round-trip
    pub async fn dashboard(&self) -> AppResult<DashboardStats> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM books) AS total_books,
                (SELECT COUNT(*) FROM copies) AS total_copies,
                (SELECT COUNT(*) FROM copies WHERE status = 'available') AS available_copies,
                (SELECT COUNT(*) FROM copies WHERE status = 'borrowed') AS borrowed_copies,
                (SELECT COUNT(*) FROM borrow_requests WHERE status = 'pending') AS pending_requests,
                (SELECT COUNT(*) FROM loans WHERE status = 'active') AS active_loans,
                (SELECT COUNT(*) FROM loans WHERE status = 'overdue') AS overdue_loans,
                (SELECT COALESCE(SUM(late_fee), 0) FROM loans
                    WHERE status IN ('active', 'overdue')) AS outstanding_fees,
                (SELECT COUNT(*) FROM notifications_queue WHERE status = 'queued') AS queued_notifications
            "#,
        )
        .fetch_one(&self.repository.pool)
        .await?;

        Ok(stats)
    }
}
