//! Borrow request lifecycle: submission, approval with copy allocation, rejection

use chrono::{NaiveDate, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        activity::RequestMeta,
        borrow_request::{
            fulfillment_totals, BorrowRequest, BorrowRequestQuery, CreateBorrowRequest, ItemFulfillment,
            RequestAction, RequestedItem,
        },
        loan::due_date_for,
    },
    repository::Repository,
};

use super::{
    changes::{ChangeAction, ChangeFeed, EntityKind},
    notifications::{self, NotificationService},
};

/// Result of processing a pending request
#[derive(Debug, Clone)]
pub struct ProcessedRequest {
    pub request: BorrowRequest,
    pub action: RequestAction,
    /// Empty for rejections
    pub fulfillment: Vec<ItemFulfillment>,
}

impl ProcessedRequest {
    /// Human-readable summary for the response
    pub fn message(&self) -> String {
        match self.action {
            RequestAction::Rejected => "Borrow request rejected".to_string(),
            RequestAction::Approved => {
                let (requested, allocated) = fulfillment_totals(&self.fulfillment);
                if allocated == requested {
                    format!("Borrow request approved; {} loan(s) created", allocated)
                } else {
                    format!(
                        "Borrow request approved; {} of {} requested copies allocated",
                        allocated, requested
                    )
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct BorrowRequestService {
    repository: Repository,
    changes: ChangeFeed,
    notifications: NotificationService,
}

impl BorrowRequestService {
    pub fn new(repository: Repository, changes: ChangeFeed, notifications: NotificationService) -> Self {
        Self {
            repository,
            changes,
            notifications,
        }
    }

    /// Submit a new request. Availability is only checked at approval.
    pub async fn submit(&self, mut request: CreateBorrowRequest) -> AppResult<BorrowRequest> {
        request.validate()?;

        let ids: Vec<Uuid> = request.requested_items.iter().map(|item| item.book_id).collect();
        let missing = self.repository.books.missing_ids(&ids).await?;
        if !missing.is_empty() {
            let list: Vec<String> = missing.iter().map(Uuid::to_string).collect();
            return Err(AppError::BadRequest(format!("Unknown book id(s): {}", list.join(", "))));
        }

        self.fill_titles(&mut request.requested_items).await?;

        let (created, queue_id) = self
            .repository
            .borrow_requests
            .create(&request, |created| {
                notifications::submission_email(
                    &created.email,
                    &created.requester_name,
                    &created.titles_label(),
                    created.desired_duration_days,
                    &created.pickup_location,
                )
            })
            .await?;
        tracing::info!(
            request_id = %created.id,
            items = created.requested_items.len(),
            notification_id = %queue_id,
            "Borrow request submitted"
        );
        self.changes
            .publish(EntityKind::BorrowRequests, ChangeAction::Insert, created.id);

        Ok(created)
    }

    /// Capture display titles so notifications do not depend on later edits
    async fn fill_titles(&self, items: &mut [RequestedItem]) -> AppResult<()> {
        for item in items.iter_mut().filter(|item| item.title.is_none()) {
            item.title = Some(self.repository.books.get_by_id(item.book_id).await?.title);
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> AppResult<BorrowRequest> {
        self.repository.borrow_requests.get_by_id(id).await
    }

    pub async fn list(&self, query: &BorrowRequestQuery) -> AppResult<(Vec<BorrowRequest>, i64)> {
        self.repository.borrow_requests.list(query).await
    }

    /// Approve or reject a pending request
    pub async fn process(
        &self,
        id: Uuid,
        action: RequestAction,
        actor: &str,
        admin_notes: Option<&str>,
        meta: &RequestMeta,
    ) -> AppResult<ProcessedRequest> {
        match action {
            RequestAction::Approved => self.approve(id, actor, admin_notes, Utc::now().date_naive(), meta).await,
            RequestAction::Rejected => self.reject(id, actor, admin_notes, meta).await,
        }
    }

    async fn approve(
        &self,
        id: Uuid,
        actor: &str,
        admin_notes: Option<&str>,
        today: NaiveDate,
        meta: &RequestMeta,
    ) -> AppResult<ProcessedRequest> {
        let approval = self
            .repository
            .borrow_requests
            .approve(id, actor, admin_notes, today, meta)
            .await?;

        let (requested, allocated) = fulfillment_totals(&approval.fulfillment);
        tracing::info!(
            request_id = %id,
            requested,
            allocated,
            actor,
            "Borrow request approved"
        );

        self.changes
            .publish(EntityKind::BorrowRequests, ChangeAction::Update, id);
        for loan in &approval.loans {
            self.changes.publish(EntityKind::Loans, ChangeAction::Insert, loan.id);
            if let Some(copy_id) = loan.copy_id {
                self.changes.publish(EntityKind::Copies, ChangeAction::Update, copy_id);
            }
        }

        let request = &approval.request;
        let message = notifications::approval_email(
            &request.email,
            &request.requester_name,
            &request.titles_label(),
            due_date_for(today, request.desired_duration_days),
            &request.pickup_location,
        );
        self.notifications.send_best_effort(&message).await;

        Ok(ProcessedRequest {
            request: approval.request,
            action: RequestAction::Approved,
            fulfillment: approval.fulfillment,
        })
    }

    async fn reject(
        &self,
        id: Uuid,
        actor: &str,
        admin_notes: Option<&str>,
        meta: &RequestMeta,
    ) -> AppResult<ProcessedRequest> {
        let request = self
            .repository
            .borrow_requests
            .reject(id, actor, admin_notes, meta)
            .await?;
        tracing::info!(request_id = %id, actor, "Borrow request rejected");

        self.changes
            .publish(EntityKind::BorrowRequests, ChangeAction::Update, id);

        let message = notifications::rejection_email(
            &request.email,
            &request.requester_name,
            &request.titles_label(),
            request.admin_notes.as_deref(),
        );
        self.notifications.send_best_effort(&message).await;

        Ok(ProcessedRequest {
            request,
            action: RequestAction::Rejected,
            fulfillment: Vec::new(),
        })
    }

    /// Replace admin notes on any request
    pub async fn update_notes(&self, id: Uuid, notes: Option<&str>) -> AppResult<BorrowRequest> {
        let request = self.repository.borrow_requests.update_notes(id, notes).await?;
        self.changes
            .publish(EntityKind::BorrowRequests, ChangeAction::Update, id);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::borrow_request::RequestStatus;
    use sqlx::types::Json;

    fn processed(action: RequestAction, fulfillment: Vec<ItemFulfillment>) -> ProcessedRequest {
        ProcessedRequest {
            request: BorrowRequest {
                id: Uuid::new_v4(),
                requester_name: "Ada".to_string(),
                email: "ada@example.org".to_string(),
                phone: None,
                affiliation: "student".to_string(),
                id_number: None,
                membership_id: None,
                requested_items: Json(Vec::new()),
                desired_duration_days: 14,
                pickup_location: "Main desk".to_string(),
                purpose: None,
                status: RequestStatus::Approved,
                admin_notes: None,
                approved_by: Some("admin".to_string()),
                approved_at: Some(Utc::now()),
                created_at: Utc::now(),
                updated_at: None,
            },
            action,
            fulfillment,
        }
    }

    fn item(quantity: u32) -> RequestedItem {
        RequestedItem {
            book_id: Uuid::new_v4(),
            quantity,
            title: None,
        }
    }

    #[test]
    fn test_message_full_allocation() {
        let mut outcome = ItemFulfillment::new(&item(1));
        outcome.record_loan(Uuid::new_v4());
        let result = processed(RequestAction::Approved, vec![outcome]);
        assert_eq!(result.message(), "Borrow request approved; 1 loan(s) created");
    }

    #[test]
    fn test_message_partial_allocation() {
        let mut outcome = ItemFulfillment::new(&item(3));
        outcome.record_loan(Uuid::new_v4());
        let result = processed(RequestAction::Approved, vec![outcome, ItemFulfillment::new(&item(1))]);
        assert_eq!(
            result.message(),
            "Borrow request approved; 1 of 4 requested copies allocated"
        );
    }

    #[test]
    fn test_message_rejection() {
        let result = processed(RequestAction::Rejected, Vec::new());
        assert_eq!(result.message(), "Borrow request rejected");
    }
}
