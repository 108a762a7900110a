//! Queued outbound notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    /// Claimed by a sender, delivery in progress
    Sending,
    Sent,
    Failed,
}

text_enum!(NotificationStatus {
    Queued => "queued",
    Sending => "sending",
    Sent => "sent",
    Failed => "failed",
});

impl NotificationStatus {
    /// Why an entry in this status cannot be claimed for delivery
    pub fn claim_conflict(self) -> &'static str {
        match self {
            NotificationStatus::Queued => "Notification is queued but could not be claimed",
            NotificationStatus::Sending => "Notification is already being delivered",
            NotificationStatus::Sent => "Notification has already been sent",
            NotificationStatus::Failed => "Notification delivery has failed permanently",
        }
    }
}

/// Row of `notifications_queue`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct QueuedNotification {
    pub id: Uuid,
    pub notification_type: String,
    pub to_email: String,
    pub subject: String,
    /// HTML body
    pub content: String,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Queue listing filter
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub status: Option<NotificationStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Outgoing email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
}

impl EmailMessage {
    /// Plain-text body, derived from the HTML when no text part was given
    pub fn text_body(&self) -> String {
        match (&self.text, &self.html) {
            (Some(text), _) => text.clone(),
            (None, Some(html)) => strip_tags(html),
            (None, None) => String::new(),
        }
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_body_prefers_text_part() {
        let msg = EmailMessage {
            to: "a@b.c".into(),
            subject: "s".into(),
            html: Some("<p>html</p>".into()),
            text: Some("plain".into()),
        };
        assert_eq!(msg.text_body(), "plain");
    }

    #[test]
    fn test_claim_conflict_messages() {
        assert_eq!(
            NotificationStatus::Sent.claim_conflict(),
            "Notification has already been sent"
        );
        assert_eq!(
            NotificationStatus::Sending.claim_conflict(),
            "Notification is already being delivered"
        );
        assert_eq!("sending".parse::<NotificationStatus>().ok(), Some(NotificationStatus::Sending));
    }

    #[test]
    fn test_text_body_strips_html() {
        let msg = EmailMessage {
            to: "a@b.c".into(),
            subject: "s".into(),
            html: Some("<h2>Overdue Book Notice</h2>\n  <p>Dear <b>Ada</b>,</p>".into()),
            text: None,
        };
        assert_eq!(msg.text_body(), "Overdue Book Notice\nDear Ada,");
    }
}
