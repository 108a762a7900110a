//! Borrow request model and the approval fulfillment report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::text_enum;

/// Borrow request status. `pending` is the only mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(RequestStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// Requester affiliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Affiliation {
    Student,
    Staff,
    Public,
    Other,
}

text_enum!(Affiliation {
    Student => "student",
    Staff => "staff",
    Public => "public",
    Other => "other",
});

fn default_quantity() -> u32 {
    1
}

/// One entry of `requested_items`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct RequestedItem {
    #[serde(alias = "id")]
    pub book_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 10, message = "Quantity must be between 1 and 10"))]
    pub quantity: u32,
    /// Display title captured at submission time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Borrow request row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRequest {
    pub id: Uuid,
    pub requester_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub affiliation: String,
    pub id_number: Option<String>,
    pub membership_id: Option<String>,
    #[schema(value_type = Vec<RequestedItem>)]
    pub requested_items: Json<Vec<RequestedItem>>,
    pub desired_duration_days: i32,
    pub pickup_location: String,
    pub purpose: Option<String>,
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BorrowRequest {
    /// Comma-separated titles for notifications, falling back to a count
    pub fn titles_label(&self) -> String {
        let titles: Vec<&str> = self
            .requested_items
            .iter()
            .filter_map(|item| item.title.as_deref())
            .collect();
        if titles.is_empty() {
            format!("{} book(s)", self.requested_items.len())
        } else {
            titles.join(", ")
        }
    }
}

/// Client submission of a borrow request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBorrowRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub requester_name: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 10, message = "Please enter a valid phone number"))]
    pub phone: Option<String>,
    pub affiliation: Affiliation,
    pub id_number: Option<String>,
    pub membership_id: Option<String>,
    #[validate(length(min = 1, message = "At least one book must be requested"), nested)]
    pub requested_items: Vec<RequestedItem>,
    #[validate(range(min = 1, max = 90, message = "Maximum loan period is 90 days"))]
    pub desired_duration_days: i32,
    #[validate(length(min = 1, message = "Please select a pickup location"))]
    pub pickup_location: String,
    pub purpose: Option<String>,
}

/// Admin decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    Approved,
    Rejected,
}

/// Borrow request listing filter
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BorrowRequestQuery {
    pub status: Option<RequestStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// How much of one requested item was allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    Fulfilled,
    Partial,
    Unavailable,
}

impl FulfillmentStatus {
    pub fn classify(requested: u32, allocated: u32) -> Self {
        if allocated == 0 {
            FulfillmentStatus::Unavailable
        } else if allocated >= requested {
            FulfillmentStatus::Fulfilled
        } else {
            FulfillmentStatus::Partial
        }
    }
}

/// Outcome of copy allocation for one requested item
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemFulfillment {
    pub book_id: Uuid,
    pub requested: u32,
    pub allocated: u32,
    pub loan_ids: Vec<Uuid>,
    /// Units that hit a database error and were skipped
    pub failed: u32,
    pub status: FulfillmentStatus,
}

impl ItemFulfillment {
    pub fn new(item: &RequestedItem) -> Self {
        Self {
            book_id: item.book_id,
            requested: item.quantity,
            allocated: 0,
            loan_ids: Vec::new(),
            failed: 0,
            status: FulfillmentStatus::Unavailable,
        }
    }

    pub fn record_loan(&mut self, loan_id: Uuid) {
        self.loan_ids.push(loan_id);
        self.allocated += 1;
        self.status = FulfillmentStatus::classify(self.requested, self.allocated);
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }
}

/// Totals across all items of an approval: (requested units, allocated units)
pub fn fulfillment_totals(items: &[ItemFulfillment]) -> (u32, u32) {
    items.iter().fold((0, 0), |(requested, allocated), item| {
        (requested + item.requested, allocated + item.allocated)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateBorrowRequest {
        CreateBorrowRequest {
            requester_name: "Ada Lovelace".to_string(),
            email: "ada@example.org".to_string(),
            phone: Some("5551234567".to_string()),
            affiliation: Affiliation::Student,
            id_number: Some("S-1".to_string()),
            membership_id: None,
            requested_items: vec![RequestedItem {
                book_id: Uuid::new_v4(),
                quantity: 1,
                title: None,
            }],
            desired_duration_days: 14,
            pickup_location: "Main desk".to_string(),
            purpose: None,
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_duration_out_of_range() {
        let mut request = valid_request();
        request.desired_duration_days = 91;
        assert!(request.validate().is_err());
        request.desired_duration_days = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_requires_items_and_email() {
        let mut request = valid_request();
        request.requested_items.clear();
        assert!(request.validate().is_err());

        let mut request = valid_request();
        request.email = "not-an-email".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_nested_quantity_is_validated() {
        let mut request = valid_request();
        request.requested_items[0].quantity = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_requested_item_accepts_id_alias_and_default_quantity() {
        let book_id = Uuid::new_v4();
        let item: RequestedItem =
            serde_json::from_value(serde_json::json!({ "id": book_id, "title": "Dune" })).unwrap();
        assert_eq!(item.book_id, book_id);
        assert_eq!(item.quantity, 1);
        assert_eq!(item.title.as_deref(), Some("Dune"));
    }

    #[test]
    fn test_classify_fulfillment() {
        assert_eq!(FulfillmentStatus::classify(1, 1), FulfillmentStatus::Fulfilled);
        assert_eq!(FulfillmentStatus::classify(3, 2), FulfillmentStatus::Partial);
        assert_eq!(FulfillmentStatus::classify(2, 0), FulfillmentStatus::Unavailable);
    }

    #[test]
    fn test_item_fulfillment_tracks_loans() {
        let item = RequestedItem {
            book_id: Uuid::new_v4(),
            quantity: 2,
            title: None,
        };
        let mut outcome = ItemFulfillment::new(&item);
        assert_eq!(outcome.status, FulfillmentStatus::Unavailable);

        outcome.record_loan(Uuid::new_v4());
        assert_eq!(outcome.status, FulfillmentStatus::Partial);

        outcome.record_failure();
        outcome.record_loan(Uuid::new_v4());
        assert_eq!(outcome.status, FulfillmentStatus::Fulfilled);
        assert_eq!(outcome.allocated, 2);
        assert_eq!(outcome.failed, 1);
    }

    #[test]
    fn test_fulfillment_totals() {
        let mut first = ItemFulfillment::new(&RequestedItem {
            book_id: Uuid::new_v4(),
            quantity: 1,
            title: None,
        });
        first.record_loan(Uuid::new_v4());
        let second = ItemFulfillment::new(&RequestedItem {
            book_id: Uuid::new_v4(),
            quantity: 2,
            title: None,
        });

        assert_eq!(fulfillment_totals(&[first, second]), (3, 1));
    }
}
