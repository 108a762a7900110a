//! Book (bibliographic record) model and related types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::copy::{BookCopy, CopyStatus};

/// Book row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    /// Ordered author list, duplicates allowed
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub edition: Option<String>,
    pub language: Option<String>,
    pub level_id: Option<Uuid>,
    pub cover_path: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Book fields submitted by administrators (create, update, bulk import)
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct BookData {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    /// Accepts a number or a numeric string
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    #[schema(value_type = Option<i32>)]
    pub publication_year: Option<i32>,
    pub edition: Option<String>,
    pub language: Option<String>,
    pub level_id: Option<Uuid>,
    /// Category ids; replaces the full set on update
    #[serde(default)]
    pub categories: Vec<Uuid>,
    /// Number of copies to create (bulk import only)
    #[serde(default)]
    #[validate(range(min = 1, max = 100, message = "Copies must be between 1 and 100"))]
    pub copies: Option<u32>,
}

/// Catalog entry with availability aggregated at query time
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub cover_path: Option<String>,
    pub level: Option<String>,
    pub categories: Vec<String>,
    pub total_copies: i64,
    pub available_count: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Full book view with copies, categories and availability
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub level: Option<Level>,
    pub categories: Vec<Category>,
    pub copies: Vec<BookCopy>,
    pub availability: BookAvailability,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Level {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Catalog search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Matches title or any author (case-insensitive)
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    /// Only books with at least one available copy
    pub available_only: Option<bool>,
    /// Page number (1-based)
    pub page: Option<i64>,
    /// Items per page
    pub per_page: Option<i64>,
}

/// Per-book copy counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookAvailability {
    pub book_id: Uuid,
    pub total_copies: i64,
    pub available_count: i64,
    pub borrowed_count: i64,
}

impl BookAvailability {
    pub fn is_available(&self) -> bool {
        self.available_count > 0
    }
}

/// Aggregate copy rows into per-book availability counts.
///
/// Books without copies do not appear in the result.
pub fn aggregate_availability<'a, I>(copies: I) -> HashMap<Uuid, BookAvailability>
where
    I: IntoIterator<Item = &'a BookCopy>,
{
    let mut counts: HashMap<Uuid, BookAvailability> = HashMap::new();
    for copy in copies {
        let entry = counts.entry(copy.book_id).or_insert_with(|| BookAvailability {
            book_id: copy.book_id,
            ..Default::default()
        });
        entry.total_copies += 1;
        match copy.status {
            CopyStatus::Available => entry.available_count += 1,
            CopyStatus::Borrowed => entry.borrowed_count += 1,
            CopyStatus::Maintenance | CopyStatus::Lost => {}
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy(book_id: Uuid, status: CopyStatus) -> BookCopy {
        BookCopy {
            id: Uuid::new_v4(),
            book_id,
            barcode: crate::models::copy::generate_barcode(),
            status,
            location: None,
            notes: None,
            acquisition_date: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_aggregate_availability_groups_by_book() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let copies = vec![
            copy(a, CopyStatus::Available),
            copy(a, CopyStatus::Borrowed),
            copy(a, CopyStatus::Lost),
            copy(b, CopyStatus::Borrowed),
        ];

        let counts = aggregate_availability(&copies);
        assert_eq!(counts.len(), 2);

        let book_a = counts[&a];
        assert_eq!(book_a.total_copies, 3);
        assert_eq!(book_a.available_count, 1);
        assert_eq!(book_a.borrowed_count, 1);
        assert!(book_a.is_available());

        let book_b = counts[&b];
        assert_eq!(book_b.total_copies, 1);
        assert_eq!(book_b.available_count, 0);
        assert!(!book_b.is_available());
    }

    #[test]
    fn test_book_data_copies_bounded() {
        let data: BookData =
            serde_json::from_value(serde_json::json!({ "title": "X", "copies": 4294967295u32 })).unwrap();
        assert_eq!(data.copies, Some(u32::MAX));
        assert!(data.validate().is_err());

        let zero = BookData {
            title: "X".to_string(),
            copies: Some(0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let three = BookData {
            title: "X".to_string(),
            copies: Some(3),
            ..Default::default()
        };
        assert!(three.validate().is_ok());

        let unset = BookData {
            title: "X".to_string(),
            ..Default::default()
        };
        assert!(unset.validate().is_ok());
    }

    #[test]
    fn test_aggregate_availability_empty() {
        assert!(aggregate_availability(&Vec::<BookCopy>::new()).is_empty());
    }

    #[test]
    fn test_book_data_accepts_year_as_string_or_number() {
        let data: BookData = serde_json::from_value(serde_json::json!({
            "title": "Dune",
            "authors": ["Frank Herbert"],
            "publication_year": "1965"
        }))
        .unwrap();
        assert_eq!(data.publication_year, Some(1965));

        let data: BookData = serde_json::from_value(serde_json::json!({
            "title": "Dune",
            "publication_year": 1965
        }))
        .unwrap();
        assert_eq!(data.publication_year, Some(1965));
        assert!(data.authors.is_empty());
        assert!(data.categories.is_empty());
    }

    #[test]
    fn test_book_data_requires_title() {
        let data = BookData::default();
        assert!(data.validate().is_err());
    }
}
