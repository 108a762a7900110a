//! Public catalog endpoints and borrow request submission

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{BookDetails, BookQuery, BookSummary, Category, Level},
        borrow_request::{BorrowRequest, CreateBorrowRequest},
    },
};

use super::PaginatedResponse;

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "catalog",
    params(BookQuery),
    responses(
        (status = 200, description = "Books with availability", body = PaginatedResponse<BookSummary>)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<BookSummary>>> {
    let (books, total) = state.services.catalog.search_books(&query).await?;
    Ok(Json(PaginatedResponse::new(books, total, query.page, query.per_page, 20)))
}

/// Get a book with its copies and availability
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "catalog",
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookDetails>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// List categories
#[utoipa::path(
    get,
    path = "/categories",
    tag = "catalog",
    responses(
        (status = 200, description = "All categories", body = Vec<Category>)
    )
)]
pub async fn list_categories(State(state): State<crate::AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.services.catalog.categories().await?))
}

/// List reading levels
#[utoipa::path(
    get,
    path = "/levels",
    tag = "catalog",
    responses(
        (status = 200, description = "All levels", body = Vec<Level>)
    )
)]
pub async fn list_levels(State(state): State<crate::AppState>) -> AppResult<Json<Vec<Level>>> {
    Ok(Json(state.services.catalog.levels().await?))
}

/// Submit a borrow request
#[utoipa::path(
    post,
    path = "/borrow-requests",
    tag = "catalog",
    request_body = CreateBorrowRequest,
    responses(
        (status = 201, description = "Request submitted", body = BorrowRequest),
        (status = 400, description = "Invalid request or unknown book")
    )
)]
pub async fn submit_borrow_request(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRequest>)> {
    let created = state.services.borrow_requests.submit(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
