//! Business logic services

pub mod auth;
pub mod borrow_requests;
pub mod catalog;
pub mod changes;
pub mod email;
pub mod loans;
pub mod notifications;
pub mod redis;
pub mod stats;

use crate::{config::AppConfig, error::AppResult, models::activity::ActivityQuery, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub borrow_requests: borrow_requests::BorrowRequestService,
    pub loans: loans::LoansService,
    pub notifications: notifications::NotificationService,
    pub stats: stats::StatsService,
    pub changes: changes::ChangeFeed,
    pub redis: redis::RedisService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig, redis_service: redis::RedisService) -> Self {
        let changes = changes::ChangeFeed::new();
        let email = email::EmailService::new(config.email.clone());
        let notifications =
            notifications::NotificationService::new(repository.clone(), email, &config.email);

        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone(), redis_service.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), changes.clone(), config.import.clone()),
            borrow_requests: borrow_requests::BorrowRequestService::new(
                repository.clone(),
                changes.clone(),
                notifications.clone(),
            ),
            loans: loans::LoansService::new(
                repository.clone(),
                changes.clone(),
                notifications.clone(),
                &config.fees,
                &config.loans,
            ),
            notifications,
            stats: stats::StatsService::new(repository.clone()),
            changes,
            redis: redis_service,
            repository,
        }
    }

    /// Audit trail, newest first
    pub async fn activity(
        &self,
        query: &ActivityQuery,
    ) -> AppResult<(Vec<crate::models::ActivityEntry>, i64)> {
        self.repository.activity.list(query).await
    }

    /// Database round-trip for readiness checks
    pub async fn ping_database(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
