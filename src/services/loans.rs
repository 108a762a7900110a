//! Loan management service: return, renewal and the overdue sweep

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::{FeesConfig, LoansConfig},
    error::AppResult,
    models::{
        activity::{NewActivity, RequestMeta, SYSTEM_ACTOR},
        loan::{days_overdue, FeePolicy, LoanAction, LoanDetails, LoanQuery, OverdueLoan},
    },
    repository::Repository,
};

use super::{
    changes::{ChangeAction, ChangeFeed, EntityKind},
    notifications::{self, NotificationService},
};

/// Summary of one overdue sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Loans updated by this run
    pub processed_count: usize,
    /// Past-due loans seen by this run
    pub total_overdue: usize,
    /// Overdue notices queued
    pub notices_queued: usize,
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    changes: ChangeFeed,
    notifications: NotificationService,
    fees: FeePolicy,
    max_renewals: Option<i32>,
}

impl LoansService {
    pub fn new(
        repository: Repository,
        changes: ChangeFeed,
        notifications: NotificationService,
        fees: &FeesConfig,
        loans: &LoansConfig,
    ) -> Self {
        Self {
            repository,
            changes,
            notifications,
            fees: FeePolicy::from(fees),
            max_renewals: loans.max_renewals,
        }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<LoanDetails> {
        self.repository.loans.get_details(id).await
    }

    pub async fn list(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        self.repository.loans.list(query).await
    }

    /// Open past-due loans with the fee each would carry today
    pub async fn overdue(&self) -> AppResult<Vec<OverdueLoan>> {
        let today = Utc::now().date_naive();
        let loans = self.repository.loans.past_due(today).await?;
        Ok(loans
            .into_iter()
            .map(|details| {
                let days = days_overdue(details.loan.due_date, today);
                OverdueLoan {
                    current_fee: self.fees.fee_for(days),
                    days_overdue: days,
                    details,
                }
            })
            .collect())
    }

    /// Apply an admin action to a loan
    pub async fn manage(
        &self,
        id: Uuid,
        action: LoanAction,
        actor: &str,
        meta: &RequestMeta,
    ) -> AppResult<LoanDetails> {
        match action {
            LoanAction::Return => self.return_loan(id, actor, meta).await,
            LoanAction::Renew => self.renew_loan(id, actor, meta).await,
        }
    }

    /// Return a loan and free its copy
    pub async fn return_loan(&self, id: Uuid, actor: &str, meta: &RequestMeta) -> AppResult<LoanDetails> {
        let today = Utc::now().date_naive();
        let loan = self
            .repository
            .loans
            .return_loan(id, actor, today, &self.fees, meta)
            .await?;
        tracing::info!(loan_id = %id, late_fee = %loan.late_fee, actor, "Loan returned");

        self.changes.publish(EntityKind::Loans, ChangeAction::Update, id);
        if let Some(copy_id) = loan.copy_id {
            self.changes.publish(EntityKind::Copies, ChangeAction::Update, copy_id);
        }

        let details = self.repository.loans.get_details(id).await?;
        let message = notifications::return_email(
            &details.loan.borrower_email,
            &details.loan.borrower_name,
            details.book_title.as_deref().unwrap_or("your book"),
            today,
            details.loan.late_fee,
        );
        self.notifications.send_best_effort(&message).await;

        Ok(details)
    }

    /// Renew an active loan by its original period
    pub async fn renew_loan(&self, id: Uuid, actor: &str, meta: &RequestMeta) -> AppResult<LoanDetails> {
        let previous_due = self.repository.loans.get_by_id(id).await?.due_date;
        let loan = self
            .repository
            .loans
            .renew(id, actor, self.max_renewals, meta)
            .await?;
        tracing::info!(
            loan_id = %id,
            due_date = %loan.due_date,
            renewal_count = loan.renewal_count,
            actor,
            "Loan renewed"
        );

        self.changes.publish(EntityKind::Loans, ChangeAction::Update, id);

        let details = self.repository.loans.get_details(id).await?;
        let message = notifications::renewal_email(
            &details.loan.borrower_email,
            &details.loan.borrower_name,
            details.book_title.as_deref().unwrap_or("your book"),
            previous_due,
            details.loan.due_date,
            details.loan.renewal_count,
        );
        self.notifications.send_best_effort(&message).await;

        Ok(details)
    }

    /// Flag past-due loans overdue and assess their fees for today
    pub async fn run_overdue_sweep(&self) -> AppResult<SweepReport> {
        self.sweep(Utc::now().date_naive()).await
    }

    async fn sweep(&self, today: NaiveDate) -> AppResult<SweepReport> {
        let candidates = self.repository.loans.sweep_candidates(today).await?;
        let mut report = SweepReport {
            total_overdue: candidates.len(),
            ..Default::default()
        };

        tracing::info!(candidates = candidates.len(), %today, "Overdue sweep started");

        for details in candidates {
            let id = details.loan.id;
            let title = details.book_title.clone().unwrap_or_else(|| "Unknown Title".to_string());
            let authors = details.book_authors.clone().unwrap_or_default();

            let assessed = self
                .repository
                .loans
                .assess_overdue(id, today, &self.fees, |assessment| {
                    notifications::overdue_email(
                        &assessment.loan.borrower_email,
                        &assessment.loan.borrower_name,
                        &title,
                        &authors,
                        assessment.loan.due_date,
                        assessment.days_overdue,
                        assessment.loan.late_fee,
                    )
                })
                .await;

            match assessed {
                Ok(Some(assessment)) => {
                    report.processed_count += 1;
                    if assessment.needs_notice() {
                        report.notices_queued += 1;
                    }
                    tracing::debug!(
                        loan_id = %id,
                        days_overdue = assessment.days_overdue,
                        late_fee = %assessment.loan.late_fee,
                        "Loan assessed overdue"
                    );
                    self.changes.publish(EntityKind::Loans, ChangeAction::Update, id);
                }
                Ok(None) => {
                    tracing::debug!(loan_id = %id, "Loan already assessed or closed, skipped");
                }
                Err(e) => {
                    tracing::error!(loan_id = %id, error = %e, "Failed to assess overdue loan");
                }
            }
        }

        let entry = NewActivity::new(
            SYSTEM_ACTOR,
            "daily_overdue_check",
            json!({
                "date": today,
                "processed_count": report.processed_count,
                "total_overdue": report.total_overdue,
                "notices_queued": report.notices_queued,
            }),
        );
        self.repository.activity.log(&entry).await?;

        tracing::info!(
            processed = report.processed_count,
            total = report.total_overdue,
            notices = report.notices_queued,
            "Overdue sweep finished"
        );
        Ok(report)
    }
}
