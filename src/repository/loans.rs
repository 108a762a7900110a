//! Loans repository for database operations

use chrono::NaiveDate;
use serde_json::json;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        activity::{NewActivity, RequestMeta, SYSTEM_ACTOR},
        borrow_request::BorrowRequest,
        copy::CopyStatus,
        loan::{
            days_overdue, renewed_due_date, FeePolicy, Loan, LoanDetails, LoanQuery, LoanStatus,
            OverdueAssessment,
        },
        notification::EmailMessage,
    },
};

use super::{activity, copies, notifications, paginate};

const DETAILS_SELECT: &str = r#"
    SELECT l.*, c.barcode, b.id AS book_id, b.title AS book_title, b.authors AS book_authors
    FROM loans l
    LEFT JOIN copies c ON c.id = l.copy_id
    LEFT JOIN books b ON b.id = c.book_id
    WHERE TRUE"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

/// Issue a loan of `copy_id` to the requester of `request`
pub async fn insert_for_request(
    conn: &mut PgConnection,
    request: &BorrowRequest,
    copy_id: Uuid,
    issued: NaiveDate,
    due: NaiveDate,
    actor: &str,
) -> AppResult<Loan> {
    let loan = sqlx::query_as::<_, Loan>(
        r#"
        INSERT INTO loans (borrow_request_id, copy_id, borrower_name, borrower_email, borrower_phone,
                           issued_date, due_date, loan_duration_days, status, issued_by, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(request.id)
    .bind(copy_id)
    .bind(&request.requester_name)
    .bind(&request.email)
    .bind(&request.phone)
    .bind(issued)
    .bind(due)
    .bind(request.desired_duration_days)
    .bind(LoanStatus::Active)
    .bind(actor)
    .bind(&request.purpose)
    .fetch_one(conn)
    .await?;
    Ok(loan)
}

async fn lock_loan(conn: &mut PgConnection, id: Uuid) -> AppResult<Loan> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get loan by ID with its copy and book
    pub async fn get_details(&self, id: Uuid) -> AppResult<LoanDetails> {
        let mut builder = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        builder.push(" AND l.id = ").push_bind(id);
        builder
            .build_query_as::<LoanDetails>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// List loans, most recently issued first
    pub async fn list(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        let (limit, offset) = paginate(query.page, query.per_page, 20);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans l WHERE TRUE");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        push_filters(&mut select, query);
        select
            .push(" ORDER BY l.issued_date DESC, l.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let loans = select
            .build_query_as::<LoanDetails>()
            .fetch_all(&self.pool)
            .await?;

        Ok((loans, total))
    }

    /// Open loans whose due date is before `today`, oldest due first
    pub async fn past_due(&self, today: NaiveDate) -> AppResult<Vec<LoanDetails>> {
        let mut builder = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        builder
            .push(" AND l.status IN ('active', 'overdue') AND l.due_date < ")
            .push_bind(today)
            .push(" ORDER BY l.due_date, l.id");

        let loans = builder
            .build_query_as::<LoanDetails>()
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    /// Past-due loans not yet assessed on `today`
    pub async fn sweep_candidates(&self, today: NaiveDate) -> AppResult<Vec<LoanDetails>> {
        let mut builder = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        builder
            .push(" AND l.status IN ('active', 'overdue') AND l.due_date < ")
            .push_bind(today)
            .push(" AND l.fee_assessed_on IS DISTINCT FROM ")
            .push_bind(today)
            .push(" ORDER BY l.due_date, l.id");

        let loans = builder
            .build_query_as::<LoanDetails>()
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    /// Return a loan: close it, settle the final fee and free the copy
    pub async fn return_loan(
        &self,
        id: Uuid,
        actor: &str,
        today: NaiveDate,
        policy: &FeePolicy,
        meta: &RequestMeta,
    ) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = lock_loan(&mut tx, id).await?;
        if !loan.status.is_open() {
            return Err(AppError::Conflict("Loan has already been returned".to_string()));
        }

        let overdue_days = days_overdue(loan.due_date, today);
        let final_fee = if overdue_days > 0 {
            policy.fee_for(overdue_days)
        } else {
            loan.late_fee
        };

        let returned = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET
                status = $1, returned_date = $2, returned_to = $3, late_fee = $4,
                fee_assessed_on = $2, updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(LoanStatus::Returned)
        .bind(today)
        .bind(actor)
        .bind(final_fee)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(copy_id) = returned.copy_id {
            copies::set_status(&mut tx, copy_id, CopyStatus::Available).await?;
        }

        let entry = NewActivity::new(
            actor,
            "book_returned",
            json!({
                "loan_id": id,
                "copy_id": returned.copy_id,
                "borrower": returned.borrower_name,
                "days_overdue": overdue_days,
                "late_fee": final_fee,
            }),
        )
        .entity("loan", id)
        .meta(meta);
        activity::insert(&mut tx, &entry).await?;

        tx.commit().await?;

        Ok(returned)
    }

    /// Renew an active loan by its original loan period
    pub async fn renew(
        &self,
        id: Uuid,
        actor: &str,
        max_renewals: Option<i32>,
        meta: &RequestMeta,
    ) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = lock_loan(&mut tx, id).await?;
        match loan.status {
            LoanStatus::Active => {}
            LoanStatus::Overdue => {
                return Err(AppError::BusinessRule(
                    "Overdue loans cannot be renewed; return the book first".to_string(),
                ))
            }
            LoanStatus::Returned => {
                return Err(AppError::Conflict("Loan has already been returned".to_string()))
            }
        }

        if let Some(max) = max_renewals {
            if loan.renewal_count >= max {
                return Err(AppError::BusinessRule(format!(
                    "Maximum renewals reached ({}/{})",
                    loan.renewal_count, max
                )));
            }
        }

        let new_due = renewed_due_date(loan.due_date, loan.loan_duration_days);

        let renewed = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET due_date = $1, renewal_count = renewal_count + 1, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(new_due)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let entry = NewActivity::new(
            actor,
            "loan_renewed",
            json!({
                "loan_id": id,
                "previous_due_date": loan.due_date,
                "new_due_date": new_due,
                "renewal_count": renewed.renewal_count,
            }),
        )
        .entity("loan", id)
        .meta(meta);
        activity::insert(&mut tx, &entry).await?;

        tx.commit().await?;

        Ok(renewed)
    }

    /// Mark one past-due loan overdue and set its fee for `today`.
    ///
    /// Returns `None` when the loan was closed or already assessed today by
    /// a concurrent run. `notice` builds the overdue email, queued only when
    /// the assessment calls for one.
    pub async fn assess_overdue<F>(
        &self,
        id: Uuid,
        today: NaiveDate,
        policy: &FeePolicy,
        notice: F,
    ) -> AppResult<Option<OverdueAssessment>>
    where
        F: FnOnce(&OverdueAssessment) -> EmailMessage,
    {
        let mut tx = self.pool.begin().await?;

        let loan = lock_loan(&mut tx, id).await?;
        if !loan.status.is_open() || loan.fee_assessed_on == Some(today) || loan.due_date >= today {
            return Ok(None);
        }

        let overdue_days = days_overdue(loan.due_date, today);
        let fee = policy.fee_for(overdue_days);

        let updated = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans SET status = $1, late_fee = $2, fee_assessed_on = $3, updated_at = NOW()
            WHERE id = $4 AND fee_assessed_on IS DISTINCT FROM $3
            RETURNING *
            "#,
        )
        .bind(LoanStatus::Overdue)
        .bind(fee)
        .bind(today)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(updated) = updated else {
            return Ok(None);
        };

        let assessment = OverdueAssessment {
            loan: updated,
            days_overdue: overdue_days,
            previous_status: loan.status,
            previous_fee: loan.late_fee,
        };

        let queued = if assessment.needs_notice() {
            let message = notice(&assessment);
            Some(
                notifications::enqueue(&mut tx, &message, json!({ "loan_id": id, "kind": "overdue" }))
                    .await?,
            )
        } else {
            None
        };

        let entry = NewActivity::new(
            SYSTEM_ACTOR,
            "loan_marked_overdue",
            json!({
                "loan_id": id,
                "borrower": assessment.loan.borrower_name,
                "days_overdue": overdue_days,
                "late_fee": assessment.loan.late_fee,
                "previous_fee": assessment.previous_fee,
                "notification_id": queued,
            }),
        )
        .entity("loan", id);
        activity::insert(&mut tx, &entry).await?;

        tx.commit().await?;

        Ok(Some(assessment))
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &LoanQuery) {
    if let Some(status) = query.status {
        builder.push(" AND l.status = ").push_bind(status);
    }
    if let Some(ref borrower) = query.borrower {
        let pattern = format!("%{}%", borrower.trim());
        builder
            .push(" AND (l.borrower_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR l.borrower_email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}
