//! Copy (physical instance of a book) model and related types

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::text_enum;

/// Circulation status of a copy. The only availability signal for a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Available,
    Borrowed,
    Maintenance,
    Lost,
}

text_enum!(CopyStatus {
    Available => "available",
    Borrowed => "borrowed",
    Maintenance => "maintenance",
    Lost => "lost",
});

/// Copy row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookCopy {
    pub id: Uuid,
    pub book_id: Uuid,
    pub barcode: String,
    pub status: CopyStatus,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub acquisition_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Generate a barcode of the form `BH-<unix millis>-<4 digits>`.
///
/// The random suffix keeps barcodes distinct when several copies are
/// created within the same millisecond (bulk import).
pub fn generate_barcode() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("BH-{}-{:04}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_format() {
        let barcode = generate_barcode();
        let parts: Vec<&str> = barcode.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "BH");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("available".parse::<CopyStatus>(), Ok(CopyStatus::Available));
        assert_eq!("Borrowed".parse::<CopyStatus>(), Ok(CopyStatus::Borrowed));
        assert!("on_shelf".parse::<CopyStatus>().is_err());
        assert_eq!(CopyStatus::Maintenance.to_string(), "maintenance");
    }
}
