//! Function-style endpoints: one POST per lifecycle operation

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        activity::RequestMeta,
        book::{Book, BookData},
        borrow_request::{ItemFulfillment, RequestAction},
        copy::BookCopy,
        loan::{LoanAction, LoanDetails},
        notification::EmailMessage,
    },
    services::{catalog::ImportResult, loans::SweepReport},
};

use super::{actor_name, AuthenticatedAdmin};

#[derive(Deserialize, ToSchema)]
pub struct CheckPasswordRequest {
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckPasswordResponse {
    pub success: bool,
    /// Bearer token for privileged endpoints
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookAction {
    Create,
    Update,
    Delete,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManageBookRequest {
    pub action: BookAction,
    pub book_data: Option<BookData>,
    pub book_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct ManageBookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<Book>,
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManageCopyRequest {
    pub book_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct ManageCopyResponse {
    pub success: bool,
    pub copy: BookCopy,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBorrowRequest {
    pub request_id: Uuid,
    pub action: RequestAction,
    pub admin_email: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ProcessBorrowResponse {
    pub success: bool,
    pub message: String,
    /// Per-item allocation report (empty on rejection)
    pub fulfillment: Vec<ItemFulfillment>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManageLoanRequest {
    pub loan_id: Uuid,
    pub action: LoanAction,
    pub admin_email: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ManageLoanResponse {
    pub success: bool,
    pub message: String,
    pub loan: LoanDetails,
}

#[derive(Deserialize, ToSchema)]
pub struct BulkImportRequest {
    pub books: Vec<BookData>,
}

#[derive(Serialize, ToSchema)]
pub struct BulkImportResponse {
    pub success: bool,
    pub imported: usize,
    pub total: usize,
    pub results: Vec<ImportResult>,
}

#[derive(Serialize, ToSchema)]
pub struct OverdueCheckResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: SweepReport,
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    #[validate(email(message = "Invalid recipient address"))]
    pub to: String,
    #[validate(length(min = 1, message = "Subject is required"))]
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    /// Queue entry settled by this send
    pub queue_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct SendEmailResponse {
    pub success: bool,
    pub email_id: Uuid,
}

/// Check the admin password and open a session
#[utoipa::path(
    post,
    path = "/functions/admin-check-password",
    tag = "functions",
    request_body = CheckPasswordRequest,
    responses(
        (status = 200, description = "Password accepted", body = CheckPasswordResponse),
        (status = 401, description = "Invalid password", body = crate::error::ErrorResponse),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn admin_check_password(
    State(state): State<crate::AppState>,
    meta: RequestMeta,
    Json(request): Json<CheckPasswordRequest>,
) -> AppResult<Json<CheckPasswordResponse>> {
    if request.password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }

    let session = state.services.auth.login(&request.password, &meta).await?;

    Ok(Json(CheckPasswordResponse {
        success: true,
        token: session.token,
        expires_at: session.expires_at,
    }))
}

/// Create, update or delete a book
#[utoipa::path(
    post,
    path = "/functions/admin-manage-book",
    tag = "functions",
    security(("bearer_auth" = [])),
    request_body = ManageBookRequest,
    responses(
        (status = 200, description = "Book changed", body = ManageBookResponse),
        (status = 400, description = "Missing bookData or bookId"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has copies on loan")
    )
)]
pub async fn admin_manage_book(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    meta: RequestMeta,
    Json(request): Json<ManageBookRequest>,
) -> AppResult<Json<ManageBookResponse>> {
    let catalog = &state.services.catalog;
    let actor = claims.sub.as_str();

    let (book, message) = match request.action {
        BookAction::Create => {
            let data = request
                .book_data
                .ok_or_else(|| AppError::BadRequest("bookData is required".to_string()))?;
            (catalog.create_book(&data, actor, &meta).await?, "Book created")
        }
        BookAction::Update => {
            let id = request
                .book_id
                .ok_or_else(|| AppError::BadRequest("bookId is required".to_string()))?;
            let data = request
                .book_data
                .ok_or_else(|| AppError::BadRequest("bookData is required".to_string()))?;
            (catalog.update_book(id, &data, actor, &meta).await?, "Book updated")
        }
        BookAction::Delete => {
            let id = request
                .book_id
                .ok_or_else(|| AppError::BadRequest("bookId is required".to_string()))?;
            (catalog.delete_book(id, actor, &meta).await?, "Book deleted")
        }
    };

    let book = match request.action {
        BookAction::Delete => None,
        _ => Some(book),
    };

    Ok(Json(ManageBookResponse {
        success: true,
        book,
        message: message.to_string(),
    }))
}

/// Add one copy to a book
#[utoipa::path(
    post,
    path = "/functions/admin-manage-copy",
    tag = "functions",
    security(("bearer_auth" = [])),
    request_body = ManageCopyRequest,
    responses(
        (status = 200, description = "Copy created", body = ManageCopyResponse),
        (status = 404, description = "Book not found")
    )
)]
pub async fn admin_manage_copy(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    meta: RequestMeta,
    Json(request): Json<ManageCopyRequest>,
) -> AppResult<Json<ManageCopyResponse>> {
    let copy = state
        .services
        .catalog
        .add_copy(request.book_id, &claims.sub, &meta)
        .await?;

    Ok(Json(ManageCopyResponse { success: true, copy }))
}

/// Approve or reject a pending borrow request
#[utoipa::path(
    post,
    path = "/functions/process-borrow-request",
    tag = "functions",
    security(("bearer_auth" = [])),
    request_body = ProcessBorrowRequest,
    responses(
        (status = 200, description = "Request processed", body = ProcessBorrowResponse),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not pending")
    )
)]
pub async fn process_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    meta: RequestMeta,
    Json(request): Json<ProcessBorrowRequest>,
) -> AppResult<Json<ProcessBorrowResponse>> {
    let actor = actor_name(&claims, request.admin_email.as_deref());

    let processed = state
        .services
        .borrow_requests
        .process(
            request.request_id,
            request.action,
            &actor,
            request.admin_notes.as_deref(),
            &meta,
        )
        .await?;

    Ok(Json(ProcessBorrowResponse {
        success: true,
        message: processed.message(),
        fulfillment: processed.fulfillment,
    }))
}

/// Return or renew a loan
#[utoipa::path(
    post,
    path = "/functions/admin-manage-loan",
    tag = "functions",
    security(("bearer_auth" = [])),
    request_body = ManageLoanRequest,
    responses(
        (status = 200, description = "Loan updated", body = ManageLoanResponse),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already returned"),
        (status = 422, description = "Loan cannot be renewed")
    )
)]
pub async fn admin_manage_loan(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    meta: RequestMeta,
    Json(request): Json<ManageLoanRequest>,
) -> AppResult<Json<ManageLoanResponse>> {
    let actor = actor_name(&claims, request.admin_email.as_deref());

    let loan = state
        .services
        .loans
        .manage(request.loan_id, request.action, &actor, &meta)
        .await?;

    let message = match request.action {
        LoanAction::Return => "Book returned successfully".to_string(),
        LoanAction::Renew => format!("Loan renewed until {}", loan.loan.due_date),
    };

    Ok(Json(ManageLoanResponse {
        success: true,
        message,
        loan,
    }))
}

/// Import many books, each in its own transaction
#[utoipa::path(
    post,
    path = "/functions/bulk-import-books",
    tag = "functions",
    security(("bearer_auth" = [])),
    request_body = BulkImportRequest,
    responses(
        (status = 200, description = "Import report", body = BulkImportResponse),
        (status = 400, description = "No books given")
    )
)]
pub async fn bulk_import_books(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    meta: RequestMeta,
    Json(request): Json<BulkImportRequest>,
) -> AppResult<Json<BulkImportResponse>> {
    let total = request.books.len();
    let results = state
        .services
        .catalog
        .bulk_import(request.books, &claims.sub, &meta)
        .await?;

    Ok(Json(BulkImportResponse {
        success: true,
        imported: results.iter().filter(|r| r.success).count(),
        total,
        results,
    }))
}

/// Run the overdue sweep now
#[utoipa::path(
    post,
    path = "/functions/daily-overdue-check",
    tag = "functions",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = OverdueCheckResponse)
    )
)]
pub async fn daily_overdue_check(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(_claims): AuthenticatedAdmin,
) -> AppResult<Json<OverdueCheckResponse>> {
    let report = state.services.loans.run_overdue_sweep().await?;
    Ok(Json(OverdueCheckResponse {
        success: true,
        report,
    }))
}

/// Send a transactional email
#[utoipa::path(
    post,
    path = "/functions/send-email",
    tag = "functions",
    security(("bearer_auth" = [])),
    request_body = SendEmailRequest,
    responses(
        (status = 200, description = "Email sent", body = SendEmailResponse),
        (status = 400, description = "Invalid message"),
        (status = 404, description = "Queue entry not found"),
        (status = 409, description = "Queue entry already sent or being delivered"),
        (status = 500, description = "Delivery failed")
    )
)]
pub async fn send_email(
    State(state): State<crate::AppState>,
    AuthenticatedAdmin(claims): AuthenticatedAdmin,
    meta: RequestMeta,
    Json(request): Json<SendEmailRequest>,
) -> AppResult<Json<SendEmailResponse>> {
    request.validate()?;

    let message = EmailMessage {
        to: request.to,
        subject: request.subject,
        html: request.html,
        text: request.text,
    };

    let email_id = state
        .services
        .notifications
        .send(&message, request.queue_id, &claims.sub, &meta)
        .await?;

    Ok(Json(SendEmailResponse {
        success: true,
        email_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manage_book_request_uses_camel_case() {
        let id = Uuid::new_v4();
        let request: ManageBookRequest = serde_json::from_value(serde_json::json!({
            "action": "update",
            "bookId": id,
            "bookData": { "title": "Dune", "authors": ["Frank Herbert"] }
        }))
        .unwrap();

        assert_eq!(request.action, BookAction::Update);
        assert_eq!(request.book_id, Some(id));
        assert_eq!(request.book_data.unwrap().title, "Dune");
    }

    #[test]
    fn test_process_request_actions() {
        let request: ProcessBorrowRequest = serde_json::from_value(serde_json::json!({
            "requestId": Uuid::new_v4(),
            "action": "rejected",
            "adminNotes": "No copies this term"
        }))
        .unwrap();
        assert_eq!(request.action, RequestAction::Rejected);
        assert_eq!(request.admin_notes.as_deref(), Some("No copies this term"));

        let invalid = serde_json::from_value::<ProcessBorrowRequest>(serde_json::json!({
            "requestId": Uuid::new_v4(),
            "action": "maybe"
        }));
        assert!(invalid.is_err());
    }

    #[test]
    fn test_send_email_validation() {
        let request = SendEmailRequest {
            to: "not-an-address".to_string(),
            subject: "Hi".to_string(),
            html: Some("<p>Hi</p>".to_string()),
            text: None,
            queue_id: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_overdue_response_is_flat() {
        let response = OverdueCheckResponse {
            success: true,
            report: SweepReport {
                processed_count: 2,
                total_overdue: 3,
                notices_queued: 1,
            },
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["processed_count"], 2);
        assert_eq!(value["total_overdue"], 3);
        assert_eq!(value["success"], true);
    }
}
