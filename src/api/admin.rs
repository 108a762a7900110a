//! Administrator read endpoints, request notes and logout

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        activity::{ActivityEntry, ActivityQuery, RequestMeta},
        borrow_request::{BorrowRequest, BorrowRequestQuery},
        loan::{LoanDetails, LoanQuery, OverdueLoan},
        notification::{NotificationQuery, QueuedNotification},
    },
    services::stats::DashboardStats,
};

use super::{AuthenticatedAdmin, PaginatedResponse};

#[derive(Deserialize, ToSchema)]
pub struct UpdateNotesRequest {
    pub admin_notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
}

/// List borrow requests
#[utoipa::path(
    get,
    path = "/borrow-requests",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(BorrowRequestQuery),
    responses(
        (status = 200, description = "Borrow requests, newest first", body = PaginatedResponse<BorrowRequest>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_borrow_requests(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Query(query): Query<BorrowRequestQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowRequest>>> {
    let (requests, total) = state.services.borrow_requests.list(&query).await?;
    Ok(Json(PaginatedResponse::new(requests, total, query.page, query.per_page, 20)))
}

/// Get one borrow request
#[utoipa::path(
    get,
    path = "/borrow-requests/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrow request ID")
    ),
    responses(
        (status = 200, description = "Borrow request", body = BorrowRequest),
        (status = 404, description = "Request not found")
    )
)]
pub async fn get_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowRequest>> {
    Ok(Json(state.services.borrow_requests.get(id).await?))
}

/// Replace the admin notes of a request
#[utoipa::path(
    put,
    path = "/borrow-requests/{id}/notes",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Borrow request ID")
    ),
    request_body = UpdateNotesRequest,
    responses(
        (status = 200, description = "Notes updated", body = BorrowRequest),
        (status = 404, description = "Request not found")
    )
)]
pub async fn update_request_notes(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateNotesRequest>,
) -> AppResult<Json<BorrowRequest>> {
    let updated = state
        .services
        .borrow_requests
        .update_notes(id, request.admin_notes.as_deref())
        .await?;
    Ok(Json(updated))
}

/// List the outbound notification queue
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(NotificationQuery),
    responses(
        (status = 200, description = "Queue entries, newest first", body = PaginatedResponse<QueuedNotification>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_notifications(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<PaginatedResponse<QueuedNotification>>> {
    let (entries, total) = state.services.notifications.list(&query).await?;
    Ok(Json(PaginatedResponse::new(entries, total, query.page, query.per_page, 50)))
}

/// List loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans with copy and book", body = PaginatedResponse<LoanDetails>)
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    let (loans, total) = state.services.loans.list(&query).await?;
    Ok(Json(PaginatedResponse::new(loans, total, query.page, query.per_page, 20)))
}

/// Get one loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LoanDetails>> {
    Ok(Json(state.services.loans.get(id).await?))
}

/// Open loans past their due date, with today's fee
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Past-due loans", body = Vec<OverdueLoan>)
    )
)]
pub async fn list_overdue_loans(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
) -> AppResult<Json<Vec<OverdueLoan>>> {
    Ok(Json(state.services.loans.overdue().await?))
}

/// Audit trail
#[utoipa::path(
    get,
    path = "/activity",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(ActivityQuery),
    responses(
        (status = 200, description = "Activity entries, newest first", body = PaginatedResponse<ActivityEntry>)
    )
)]
pub async fn list_activity(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<PaginatedResponse<ActivityEntry>>> {
    let (entries, total) = state.services.activity(&query).await?;
    Ok(Json(PaginatedResponse::new(entries, total, query.page, query.per_page, 50)))
}

/// Dashboard counters
#[utoipa::path(
    get,
    path = "/stats",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardStats)
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
) -> AppResult<Json<DashboardStats>> {
    Ok(Json(state.services.stats.dashboard().await?))
}

/// Revoke the current session token
#[utoipa::path(
    post,
    path = "/admin/logout",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Token revoked", body = LogoutResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    meta: RequestMeta,
) -> AppResult<Json<LogoutResponse>> {
    state.services.auth.logout(&claims, &meta).await?;
    Ok(Json(LogoutResponse { success: true }))
}
