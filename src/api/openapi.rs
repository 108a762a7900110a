//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{admin, catalog, events, functions, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Book Hive API",
        version = "0.3.0",
        description = "School library lending service REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Functions
        functions::admin_check_password,
        functions::admin_manage_book,
        functions::admin_manage_copy,
        functions::process_borrow_request,
        functions::admin_manage_loan,
        functions::bulk_import_books,
        functions::daily_overdue_check,
        functions::send_email,
        // Catalog
        catalog::list_books,
        catalog::get_book,
        catalog::list_categories,
        catalog::list_levels,
        catalog::submit_borrow_request,
        // Admin
        admin::list_borrow_requests,
        admin::get_borrow_request,
        admin::update_request_notes,
        admin::list_loans,
        admin::get_loan,
        admin::list_notifications,
        admin::list_overdue_loans,
        admin::list_activity,
        admin::get_stats,
        admin::logout,
        // Events
        events::stream_events,
    ),
    components(
        schemas(
            // Functions
            functions::CheckPasswordRequest,
            functions::CheckPasswordResponse,
            functions::BookAction,
            functions::ManageBookRequest,
            functions::ManageBookResponse,
            functions::ManageCopyRequest,
            functions::ManageCopyResponse,
            functions::ProcessBorrowRequest,
            functions::ProcessBorrowResponse,
            functions::ManageLoanRequest,
            functions::ManageLoanResponse,
            functions::BulkImportRequest,
            functions::BulkImportResponse,
            functions::OverdueCheckResponse,
            functions::SendEmailRequest,
            functions::SendEmailResponse,
            crate::services::catalog::ImportResult,
            crate::services::loans::SweepReport,
            // Books and copies
            crate::models::book::Book,
            crate::models::book::BookData,
            crate::models::book::BookSummary,
            crate::models::book::BookDetails,
            crate::models::book::BookAvailability,
            crate::models::book::Category,
            crate::models::book::Level,
            crate::models::copy::BookCopy,
            crate::models::copy::CopyStatus,
            // Borrow requests
            crate::models::borrow_request::BorrowRequest,
            crate::models::borrow_request::CreateBorrowRequest,
            crate::models::borrow_request::RequestedItem,
            crate::models::borrow_request::RequestStatus,
            crate::models::borrow_request::RequestAction,
            crate::models::borrow_request::Affiliation,
            crate::models::borrow_request::ItemFulfillment,
            crate::models::borrow_request::FulfillmentStatus,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            crate::models::loan::OverdueLoan,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanAction,
            // Admin
            admin::UpdateNotesRequest,
            admin::LogoutResponse,
            crate::models::activity::ActivityEntry,
            crate::models::notification::QueuedNotification,
            crate::models::notification::NotificationStatus,
            crate::services::stats::DashboardStats,
            // Events
            crate::services::changes::ChangeEvent,
            crate::services::changes::EntityKind,
            crate::services::changes::ChangeAction,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "functions", description = "Administrative workflows and scheduled jobs"),
        (name = "catalog", description = "Public catalog and borrow request submission"),
        (name = "admin", description = "Administrator read access"),
        (name = "events", description = "Change feed")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
