//! In-process change feed keyed by entity kind

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// Kinds of entity a subscriber can follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Books,
    Copies,
    BorrowRequests,
    Loans,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Books,
        EntityKind::Copies,
        EntityKind::BorrowRequests,
        EntityKind::Loans,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Books => "books",
            EntityKind::Copies => "copies",
            EntityKind::BorrowRequests => "borrow_requests",
            EntityKind::Loans => "loans",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown entity kind: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// One committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub action: ChangeAction,
    pub id: Uuid,
}

/// Single dispatcher for all entity changes
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish a change. Having no subscriber is not an error.
    pub fn publish(&self, entity: EntityKind, action: ChangeAction, id: Uuid) {
        let event = ChangeEvent { entity, action, id };
        if self.sender.send(event).is_err() {
            tracing::trace!(entity = entity.as_str(), "No change feed subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

/// Parse a comma-separated list of entity kinds; empty means all
pub fn parse_kinds(list: Option<&str>) -> Result<Vec<EntityKind>, String> {
    match list.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(EntityKind::ALL.to_vec()),
        Some(list) => list.split(',').map(EntityKind::from_str).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert_eq!(parse_kinds(None).unwrap().len(), 4);
        assert_eq!(parse_kinds(Some("")).unwrap().len(), 4);
        assert_eq!(
            parse_kinds(Some("loans, copies")).unwrap(),
            vec![EntityKind::Loans, EntityKind::Copies]
        );
        assert!(parse_kinds(Some("loans,patrons")).is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        let id = Uuid::new_v4();

        feed.publish(EntityKind::Loans, ChangeAction::Update, id);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.entity, EntityKind::Loans);
        assert_eq!(event.action, ChangeAction::Update);
        assert_eq!(event.id, id);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        ChangeFeed::new().publish(EntityKind::Books, ChangeAction::Delete, Uuid::new_v4());
    }
}
