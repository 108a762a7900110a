//! Loan model, state machine and late-fee arithmetic

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::text_enum;
use crate::config::FeesConfig;

/// Loan status. `overdue` is only entered through the overdue sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

text_enum!(LoanStatus {
    Active => "active",
    Overdue => "overdue",
    Returned => "returned",
});

impl LoanStatus {
    /// Active and overdue loans hold their copy
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }
}

/// Loan row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: Uuid,
    pub borrow_request_id: Option<Uuid>,
    pub copy_id: Option<Uuid>,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrower_phone: Option<String>,
    pub issued_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Loan period at first issuance; each renewal extends by this much
    pub loan_duration_days: i32,
    pub status: LoanStatus,
    pub renewal_count: i32,
    #[schema(value_type = String)]
    pub late_fee: Decimal,
    pub fee_assessed_on: Option<NaiveDate>,
    pub issued_by: String,
    pub returned_date: Option<NaiveDate>,
    pub returned_to: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Loan joined with its copy and book for admin listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub loan: Loan,
    pub barcode: Option<String>,
    pub book_id: Option<Uuid>,
    pub book_title: Option<String>,
    pub book_authors: Option<Vec<String>>,
}

/// Overdue listing entry with the fee the loan would carry today
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OverdueLoan {
    #[serde(flatten)]
    pub details: LoanDetails,
    pub days_overdue: i64,
    #[schema(value_type = String)]
    pub current_fee: Decimal,
}

/// Loan listing filter
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub status: Option<LoanStatus>,
    /// Matches borrower name or email (case-insensitive)
    pub borrower: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Admin action on a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanAction {
    Return,
    Renew,
}

/// Result of assessing one past-due loan during the overdue sweep
#[derive(Debug, Clone)]
pub struct OverdueAssessment {
    /// Loan after the update
    pub loan: Loan,
    pub days_overdue: i64,
    pub previous_status: LoanStatus,
    pub previous_fee: Decimal,
}

impl OverdueAssessment {
    /// A notice goes out when the loan first turns overdue or its fee moved
    pub fn needs_notice(&self) -> bool {
        self.previous_status != LoanStatus::Overdue || self.previous_fee != self.loan.late_fee
    }
}

/// Late fee policy: flat rate per overdue day with an optional cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeePolicy {
    pub per_day: Decimal,
    pub cap: Option<Decimal>,
}

impl From<&FeesConfig> for FeePolicy {
    fn from(config: &FeesConfig) -> Self {
        Self {
            per_day: config.per_day,
            cap: config.cap,
        }
    }
}

impl FeePolicy {
    /// Total fee for a loan overdue by `days_overdue` days.
    ///
    /// Always computed from scratch so repeated sweeps never double-charge.
    pub fn fee_for(&self, days_overdue: i64) -> Decimal {
        if days_overdue <= 0 {
            return Decimal::ZERO;
        }
        let fee = self.per_day * Decimal::from(days_overdue);
        let fee = match self.cap {
            Some(cap) if fee > cap => cap,
            _ => fee,
        };
        fee.round_dp(2)
    }
}

/// Whole days past the due date. A loan is due at the end of its due date.
pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - due_date).num_days().max(0)
}

/// Due date for a loan issued on `issued` for `duration_days`
pub fn due_date_for(issued: NaiveDate, duration_days: i32) -> NaiveDate {
    issued + Duration::days(i64::from(duration_days))
}

/// Due date after one renewal: the current due date pushed by the original loan period
pub fn renewed_due_date(current_due: NaiveDate, loan_duration_days: i32) -> NaiveDate {
    due_date_for(current_due, loan_duration_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn flat_policy() -> FeePolicy {
        FeePolicy {
            per_day: Decimal::ONE,
            cap: None,
        }
    }

    #[test]
    fn test_days_overdue() {
        assert_eq!(days_overdue(date("2025-03-01"), date("2025-03-06")), 5);
        assert_eq!(days_overdue(date("2025-03-06"), date("2025-03-06")), 0);
        assert_eq!(days_overdue(date("2025-03-10"), date("2025-03-06")), 0);
    }

    #[test]
    fn test_fee_is_recomputed_not_accumulated() {
        let policy = flat_policy();
        let days = days_overdue(date("2025-03-01"), date("2025-03-06"));
        let first = policy.fee_for(days);
        let second = policy.fee_for(days);
        assert_eq!(first, Decimal::from(5));
        assert_eq!(first, second);
    }

    #[test]
    fn test_fee_cap() {
        let policy = FeePolicy {
            per_day: Decimal::from_str("0.50").unwrap(),
            cap: Some(Decimal::from(25)),
        };
        assert_eq!(policy.fee_for(10), Decimal::from(5));
        assert_eq!(policy.fee_for(50), Decimal::from(25));
        assert_eq!(policy.fee_for(80), Decimal::from(25));
        assert_eq!(policy.fee_for(0), Decimal::ZERO);
    }

    #[test]
    fn test_due_date_for() {
        assert_eq!(due_date_for(date("2025-01-25"), 14), date("2025-02-08"));
    }

    #[test]
    fn test_renewal_extends_by_original_duration() {
        let issued = date("2025-01-01");
        let due = due_date_for(issued, 14);
        let renewed = renewed_due_date(due, 14);
        assert_eq!(renewed, date("2025-01-29"));
        // A second renewal extends by the original period again, not by due - issued
        assert_eq!(renewed_due_date(renewed, 14), date("2025-02-12"));
    }

    fn sample_loan(status: LoanStatus, late_fee: Decimal) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            borrow_request_id: None,
            copy_id: Some(Uuid::new_v4()),
            borrower_name: "Ada".to_string(),
            borrower_email: "ada@example.org".to_string(),
            borrower_phone: None,
            issued_date: date("2025-02-01"),
            due_date: date("2025-02-15"),
            loan_duration_days: 14,
            status,
            renewal_count: 0,
            late_fee,
            fee_assessed_on: None,
            issued_by: "admin".to_string(),
            returned_date: None,
            returned_to: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_notice_on_transition_or_fee_change_only() {
        let first = OverdueAssessment {
            loan: sample_loan(LoanStatus::Overdue, Decimal::from(5)),
            days_overdue: 5,
            previous_status: LoanStatus::Active,
            previous_fee: Decimal::ZERO,
        };
        assert!(first.needs_notice());

        let next_day = OverdueAssessment {
            loan: sample_loan(LoanStatus::Overdue, Decimal::from(6)),
            days_overdue: 6,
            previous_status: LoanStatus::Overdue,
            previous_fee: Decimal::from(5),
        };
        assert!(next_day.needs_notice());

        let capped = OverdueAssessment {
            loan: sample_loan(LoanStatus::Overdue, Decimal::from(25)),
            days_overdue: 40,
            previous_status: LoanStatus::Overdue,
            previous_fee: Decimal::from(25),
        };
        assert!(!capped.needs_notice());
    }

    #[test]
    fn test_open_statuses() {
        assert!(LoanStatus::Active.is_open());
        assert!(LoanStatus::Overdue.is_open());
        assert!(!LoanStatus::Returned.is_open());
    }
}
