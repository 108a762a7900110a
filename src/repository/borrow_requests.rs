//! Borrow requests repository, including copy allocation on approval

use chrono::NaiveDate;
use serde_json::json;
use sqlx::{types::Json, Acquire, PgConnection, Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        activity::{NewActivity, RequestMeta},
        borrow_request::{
            fulfillment_totals, BorrowRequest, BorrowRequestQuery, CreateBorrowRequest, ItemFulfillment,
            RequestStatus,
        },
        loan::{due_date_for, Loan},
        notification::EmailMessage,
    },
};

use super::{activity, copies, loans, notifications, paginate};

/// Outcome of an approval transaction
#[derive(Debug)]
pub struct Approval {
    pub request: BorrowRequest,
    pub fulfillment: Vec<ItemFulfillment>,
    pub loans: Vec<Loan>,
}

#[derive(Clone)]
pub struct BorrowRequestsRepository {
    pool: Pool<Postgres>,
}

async fn lock_pending(conn: &mut PgConnection, id: Uuid) -> AppResult<BorrowRequest> {
    let request = sqlx::query_as::<_, BorrowRequest>("SELECT * FROM borrow_requests WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Borrow request with id {} not found", id)))?;

    if request.status != RequestStatus::Pending {
        return Err(AppError::Conflict(format!(
            "Borrow request has already been {}",
            request.status
        )));
    }
    Ok(request)
}

/// Claim one copy and issue its loan. `None` when the book has no copy left.
async fn allocate_unit(
    conn: &mut PgConnection,
    request: &BorrowRequest,
    book_id: Uuid,
    issued: NaiveDate,
    due: NaiveDate,
    actor: &str,
) -> AppResult<Option<Loan>> {
    let Some(copy_id) = copies::claim_available(&mut *conn, book_id).await? else {
        return Ok(None);
    };
    let loan = loans::insert_for_request(conn, request, copy_id, issued, due, actor).await?;
    Ok(Some(loan))
}

impl BorrowRequestsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a new pending request and queue its confirmation for the requester
    pub async fn create<F>(&self, request: &CreateBorrowRequest, notice: F) -> AppResult<(BorrowRequest, Uuid)>
    where
        F: FnOnce(&BorrowRequest) -> EmailMessage,
    {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, BorrowRequest>(
            r#"
            INSERT INTO borrow_requests (requester_name, email, phone, affiliation, id_number,
                                         membership_id, requested_items, desired_duration_days,
                                         pickup_location, purpose, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&request.requester_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(request.affiliation)
        .bind(&request.id_number)
        .bind(&request.membership_id)
        .bind(Json(&request.requested_items))
        .bind(request.desired_duration_days)
        .bind(&request.pickup_location)
        .bind(&request.purpose)
        .bind(RequestStatus::Pending)
        .fetch_one(&mut *tx)
        .await?;

        let book_ids: Vec<Uuid> = created.requested_items.iter().map(|item| item.book_id).collect();
        let queue_id = notifications::enqueue(
            &mut tx,
            &notice(&created),
            json!({ "request_id": created.id, "book_ids": book_ids, "kind": "submitted" }),
        )
        .await?;

        tx.commit().await?;

        Ok((created, queue_id))
    }

    /// Get borrow request by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowRequest> {
        sqlx::query_as::<_, BorrowRequest>("SELECT * FROM borrow_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow request with id {} not found", id)))
    }

    /// List requests, newest first
    pub async fn list(&self, query: &BorrowRequestQuery) -> AppResult<(Vec<BorrowRequest>, i64)> {
        let (limit, offset) = paginate(query.page, query.per_page, 20);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM borrow_requests WHERE TRUE");
        if let Some(status) = query.status {
            count.push(" AND status = ").push_bind(status);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM borrow_requests WHERE TRUE");
        if let Some(status) = query.status {
            select.push(" AND status = ").push_bind(status);
        }
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let requests = select
            .build_query_as::<BorrowRequest>()
            .fetch_all(&self.pool)
            .await?;

        Ok((requests, total))
    }

    /// Approve a pending request and allocate copies.
    ///
    /// Each unit runs in its own savepoint: a unit that errors is rolled
    /// back and reported as failed without undoing the units before it.
    pub async fn approve(
        &self,
        id: Uuid,
        actor: &str,
        admin_notes: Option<&str>,
        today: NaiveDate,
        meta: &RequestMeta,
    ) -> AppResult<Approval> {
        let mut tx = self.pool.begin().await?;

        lock_pending(&mut tx, id).await?;

        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests SET
                status = $1, approved_by = $2, approved_at = NOW(),
                admin_notes = COALESCE($3, admin_notes), updated_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(RequestStatus::Approved)
        .bind(actor)
        .bind(admin_notes)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let due = due_date_for(today, request.desired_duration_days);
        let mut fulfillment = Vec::with_capacity(request.requested_items.len());
        let mut issued = Vec::new();

        for item in request.requested_items.iter() {
            let mut outcome = ItemFulfillment::new(item);

            for _ in 0..item.quantity {
                let mut savepoint = tx.begin().await?;
                match allocate_unit(&mut savepoint, &request, item.book_id, today, due, actor).await {
                    Ok(Some(loan)) => {
                        savepoint.commit().await?;
                        outcome.record_loan(loan.id);
                        issued.push(loan);
                    }
                    Ok(None) => {
                        savepoint.commit().await?;
                        break;
                    }
                    Err(e) => {
                        savepoint.rollback().await?;
                        tracing::warn!(
                            request_id = %id,
                            book_id = %item.book_id,
                            error = %e,
                            "Copy allocation failed for one unit"
                        );
                        outcome.record_failure();
                    }
                }
            }

            fulfillment.push(outcome);
        }

        let (requested_units, allocated_units) = fulfillment_totals(&fulfillment);
        let entry = NewActivity::new(
            actor,
            "borrow_request_approved",
            json!({
                "request_id": id,
                "requester": request.requester_name,
                "due_date": due,
                "requested_units": requested_units,
                "allocated_units": allocated_units,
                "fulfillment": fulfillment,
            }),
        )
        .entity("borrow_request", id)
        .meta(meta);
        activity::insert(&mut tx, &entry).await?;

        tx.commit().await?;

        Ok(Approval {
            request,
            fulfillment,
            loans: issued,
        })
    }

    /// Reject a pending request. Never touches loans or copies.
    pub async fn reject(
        &self,
        id: Uuid,
        actor: &str,
        admin_notes: Option<&str>,
        meta: &RequestMeta,
    ) -> AppResult<BorrowRequest> {
        let mut tx = self.pool.begin().await?;

        lock_pending(&mut tx, id).await?;

        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests SET
                status = $1, approved_by = NULL, approved_at = NULL,
                admin_notes = COALESCE($2, admin_notes), updated_at = NOW()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(RequestStatus::Rejected)
        .bind(admin_notes)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let entry = NewActivity::new(
            actor,
            "borrow_request_rejected",
            json!({
                "request_id": id,
                "requester": request.requester_name,
                "admin_notes": request.admin_notes,
            }),
        )
        .entity("borrow_request", id)
        .meta(meta);
        activity::insert(&mut tx, &entry).await?;

        tx.commit().await?;

        Ok(request)
    }

    /// Replace the admin notes of a request in any status
    pub async fn update_notes(&self, id: Uuid, notes: Option<&str>) -> AppResult<BorrowRequest> {
        sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests SET admin_notes = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(notes)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Borrow request with id {} not found", id)))
    }
}
