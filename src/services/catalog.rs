//! Catalog service: browsing, book and copy administration, bulk import

use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::ImportConfig,
    error::{AppError, AppResult},
    models::{
        activity::{NewActivity, RequestMeta},
        book::{Book, BookData, BookDetails, BookQuery, BookSummary, Category, Level},
        copy::BookCopy,
    },
    repository::Repository,
};

use super::changes::{ChangeAction, ChangeFeed, EntityKind};

/// Outcome of importing one book
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub title: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copies: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    changes: ChangeFeed,
    import: ImportConfig,
}

impl CatalogService {
    pub fn new(repository: Repository, changes: ChangeFeed, import: ImportConfig) -> Self {
        Self {
            repository,
            changes,
            import,
        }
    }

    /// Search the catalog
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<BookSummary>, i64)> {
        self.repository.books.search(query).await
    }

    /// Get book details with copies and availability
    pub async fn get_book(&self, id: Uuid) -> AppResult<BookDetails> {
        self.repository.books.get_details(id).await
    }

    pub async fn categories(&self) -> AppResult<Vec<Category>> {
        self.repository.books.categories().await
    }

    pub async fn levels(&self) -> AppResult<Vec<Level>> {
        self.repository.books.levels().await
    }

    /// Create a book with exactly one initial copy
    pub async fn create_book(&self, data: &BookData, actor: &str, meta: &RequestMeta) -> AppResult<Book> {
        data.validate()?;

        let (book, copies) = self.repository.books.create(data, 1).await?;
        tracing::info!(book_id = %book.id, title = %book.title, "Book created");

        self.audit(actor, "book_created", &book, json!({ "title": book.title, "copies": copies.len() }), meta)
            .await;
        self.changes.publish(EntityKind::Books, ChangeAction::Insert, book.id);
        for copy in &copies {
            self.changes.publish(EntityKind::Copies, ChangeAction::Insert, copy.id);
        }

        Ok(book)
    }

    /// Update book fields and replace its categories
    pub async fn update_book(
        &self,
        id: Uuid,
        data: &BookData,
        actor: &str,
        meta: &RequestMeta,
    ) -> AppResult<Book> {
        data.validate()?;

        let book = self.repository.books.update(id, data).await?;
        tracing::info!(book_id = %book.id, "Book updated");

        self.audit(actor, "book_updated", &book, json!({ "title": book.title }), meta)
            .await;
        self.changes.publish(EntityKind::Books, ChangeAction::Update, book.id);

        Ok(book)
    }

    /// Delete a book unless one of its copies is on loan
    pub async fn delete_book(&self, id: Uuid, actor: &str, meta: &RequestMeta) -> AppResult<Book> {
        let book = self.repository.books.delete(id).await?;
        tracing::info!(book_id = %book.id, "Book deleted");

        self.audit(actor, "book_deleted", &book, json!({ "title": book.title }), meta)
            .await;
        self.changes.publish(EntityKind::Books, ChangeAction::Delete, book.id);

        Ok(book)
    }

    /// Add one available copy to an existing book
    pub async fn add_copy(&self, book_id: Uuid, actor: &str, meta: &RequestMeta) -> AppResult<BookCopy> {
        if !self.repository.books.exists(book_id).await? {
            return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
        }

        let copy = self.repository.copies.add_copy(book_id).await?;
        tracing::info!(book_id = %book_id, copy_id = %copy.id, barcode = %copy.barcode, "Copy added");

        let entry = NewActivity::new(
            actor,
            "copy_added",
            json!({ "book_id": book_id, "barcode": copy.barcode }),
        )
        .entity("copy", copy.id)
        .meta(meta);
        if let Err(e) = self.repository.activity.log(&entry).await {
            tracing::warn!(error = %e, "Failed to record copy activity");
        }
        self.changes.publish(EntityKind::Copies, ChangeAction::Insert, copy.id);

        Ok(copy)
    }

    /// Import books one by one, each in its own transaction
    pub async fn bulk_import(
        &self,
        books: Vec<BookData>,
        actor: &str,
        meta: &RequestMeta,
    ) -> AppResult<Vec<ImportResult>> {
        if books.is_empty() {
            return Err(AppError::BadRequest("No books to import".to_string()));
        }

        tracing::info!(count = books.len(), "Bulk importing books");

        let mut results = Vec::with_capacity(books.len());
        for mut data in books {
            if data.language.as_deref().map_or(true, |l| l.trim().is_empty()) {
                data.language = Some(self.import.default_language.clone());
            }
            // The configured default goes through the same bounds check
            let copy_count = *data.copies.get_or_insert(self.import.default_copies);

            let outcome = match data.validate() {
                Ok(()) => self.repository.books.create(&data, copy_count).await,
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok((book, copies)) => {
                    self.changes.publish(EntityKind::Books, ChangeAction::Insert, book.id);
                    results.push(ImportResult {
                        title: book.title,
                        success: true,
                        book_id: Some(book.id),
                        copies: Some(copies.len() as u32),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(title = %data.title, error = %e, "Book import failed");
                    results.push(ImportResult {
                        title: data.title,
                        success: false,
                        book_id: None,
                        copies: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let imported = results.iter().filter(|r| r.success).count();
        let entry = NewActivity::new(
            actor,
            "books_imported",
            json!({ "imported": imported, "total": results.len() }),
        )
        .meta(meta);
        if let Err(e) = self.repository.activity.log(&entry).await {
            tracing::warn!(error = %e, "Failed to record import activity");
        }

        Ok(results)
    }

    async fn audit(&self, actor: &str, action: &str, book: &Book, details: serde_json::Value, meta: &RequestMeta) {
        let entry = NewActivity::new(actor, action, details)
            .entity("book", book.id)
            .meta(meta);
        if let Err(e) = self.repository.activity.log(&entry).await {
            tracing::warn!(action, error = %e, "Failed to record book activity");
        }
    }
}
