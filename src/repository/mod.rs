//! Repository layer for database operations

pub mod activity;
pub mod admin_secrets;
pub mod books;
pub mod borrow_requests;
pub mod copies;
pub mod loans;
pub mod notifications;

use sqlx::{Pool, Postgres};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub activity: activity::ActivityRepository,
    pub admin_secrets: admin_secrets::AdminSecretsRepository,
    pub books: books::BooksRepository,
    pub borrow_requests: borrow_requests::BorrowRequestsRepository,
    pub copies: copies::CopiesRepository,
    pub loans: loans::LoansRepository,
    pub notifications: notifications::NotificationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            activity: activity::ActivityRepository::new(pool.clone()),
            admin_secrets: admin_secrets::AdminSecretsRepository::new(pool.clone()),
            books: books::BooksRepository::new(pool.clone()),
            borrow_requests: borrow_requests::BorrowRequestsRepository::new(pool.clone()),
            copies: copies::CopiesRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            notifications: notifications::NotificationsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Round-trip to the database
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Turn optional page parameters into `(limit, offset)`
pub(crate) fn paginate(page: Option<i64>, per_page: Option<i64>, default_per_page: i64) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 200);
    (per_page, (page - 1) * per_page)
}

#[cfg(test)]
mod tests {
    use super::paginate;

    #[test]
    fn test_paginate_defaults() {
        assert_eq!(paginate(None, None, 20), (20, 0));
        assert_eq!(paginate(Some(3), Some(10), 20), (10, 20));
    }

    #[test]
    fn test_paginate_clamps() {
        assert_eq!(paginate(Some(0), Some(0), 20), (1, 0));
        assert_eq!(paginate(Some(-4), Some(1000), 20), (200, 0));
    }
}
