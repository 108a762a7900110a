//! Notification templates, direct sends and the queued-email flush

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::EmailConfig,
    error::AppResult,
    models::{
        activity::{NewActivity, RequestMeta, SYSTEM_ACTOR},
        notification::{EmailMessage, NotificationQuery, QueuedNotification},
    },
    repository::Repository,
};

use super::email::EmailService;

const QUEUE_BATCH: i64 = 50;
/// A `sending` claim older than this is assumed abandoned
const STALE_CLAIM_SECS: i64 = 600;
const SIGNATURE: &str = "<p>Thank you for using Book Hive!<br>Book Hive Library Team</p>\n\
<p><small>This is an automated message, please do not reply.</small></p>";

/// Counts from one pass over the notification queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationService {
    repository: Repository,
    email: EmailService,
    max_attempts: i32,
}

impl NotificationService {
    pub fn new(repository: Repository, email: EmailService, config: &EmailConfig) -> Self {
        Self {
            repository,
            email,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Send an email now, claiming and settling its queue entry when one is given
    pub async fn send(
        &self,
        message: &EmailMessage,
        queue_id: Option<Uuid>,
        actor: &str,
        meta: &RequestMeta,
    ) -> AppResult<Uuid> {
        if let Some(queue_id) = queue_id {
            self.repository.notifications.claim(queue_id).await?;
        }

        self.deliver(message, queue_id, actor, meta).await
    }

    /// Deliver a message whose queue entry, if any, is already claimed
    async fn deliver(
        &self,
        message: &EmailMessage,
        queue_id: Option<Uuid>,
        actor: &str,
        meta: &RequestMeta,
    ) -> AppResult<Uuid> {
        let email_id = match self.email.send(message).await {
            Ok(id) => id,
            Err(e) => {
                if let Some(queue_id) = queue_id {
                    self.repository.notifications.mark_failed(queue_id, self.max_attempts).await?;
                }
                return Err(e);
            }
        };

        if let Some(queue_id) = queue_id {
            self.repository.notifications.mark_sent(queue_id).await?;
        }

        let entry = NewActivity::new(
            actor,
            "Email sent",
            json!({
                "to": message.to,
                "subject": message.subject,
                "email_id": email_id,
                "queue_id": queue_id,
            }),
        )
        .meta(meta);
        if let Err(e) = self.repository.activity.log(&entry).await {
            tracing::warn!(error = %e, "Failed to record email activity");
        }

        Ok(email_id)
    }

    pub async fn list(&self, query: &NotificationQuery) -> AppResult<(Vec<QueuedNotification>, i64)> {
        self.repository.notifications.list(query).await
    }

    /// Send after a committed mutation; failures are logged only
    pub async fn send_best_effort(&self, message: &EmailMessage) {
        self.email.send_best_effort(message).await;
    }

    /// Deliver queued notifications that still have attempts left
    pub async fn flush_queue(&self) -> AppResult<FlushReport> {
        let pending = self
            .repository
            .notifications
            .claim_batch(self.max_attempts, QUEUE_BATCH, STALE_CLAIM_SECS)
            .await?;

        let mut report = FlushReport::default();
        for entry in pending {
            let message = EmailMessage {
                to: entry.to_email.clone(),
                subject: entry.subject.clone(),
                html: Some(entry.content.clone()),
                text: None,
            };

            match self.deliver(&message, Some(entry.id), SYSTEM_ACTOR, &RequestMeta::default()).await {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(queue_id = %entry.id, error = %e, "Queued notification not delivered");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Borrow request received, pending review
pub fn submission_email(
    to: &str,
    borrower_name: &str,
    titles: &str,
    duration_days: i32,
    pickup_location: &str,
) -> EmailMessage {
    let html = format!(
        r#"<h2>Borrow Request Submitted</h2>
<p>Dear {name},</p>
<p>Your request to borrow <strong>{titles}</strong> has been successfully submitted.</p>
<h3>Request Details</h3>
<ul>
<li><strong>Book:</strong> {titles}</li>
<li><strong>Duration:</strong> {days} days</li>
<li><strong>Pickup Location:</strong> {pickup}</li>
</ul>
<p>You will receive another email once your request has been reviewed by our staff.</p>
{signature}"#,
        name = escape_html(borrower_name),
        titles = escape_html(titles),
        days = duration_days,
        pickup = escape_html(pickup_location),
        signature = SIGNATURE,
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Borrow Request Submitted - Book Hive Library".to_string(),
        html: Some(html),
        text: None,
    }
}

/// Borrow request approved
pub fn approval_email(
    to: &str,
    borrower_name: &str,
    titles: &str,
    due_date: NaiveDate,
    pickup_location: &str,
) -> EmailMessage {
    let html = format!(
        r#"<h1>Loan Request Approved!</h1>
<p>Hello {name},</p>
<p>Great news! Your request to borrow <strong>{titles}</strong> has been approved by our library staff.</p>
<h3>Loan Details</h3>
<ul>
<li><strong>Book:</strong> {titles}</li>
<li><strong>Due Date:</strong> {due}</li>
<li><strong>Pickup Location:</strong> {pickup}</li>
</ul>
<h4>Important Reminders</h4>
<ul>
<li>Please bring a valid ID when picking up your book</li>
<li>Return the book by the due date to avoid late fees</li>
<li>Handle the book with care and report any damage immediately</li>
</ul>
{signature}"#,
        name = escape_html(borrower_name),
        titles = escape_html(titles),
        due = format_date(due_date),
        pickup = escape_html(pickup_location),
        signature = SIGNATURE,
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Loan Request Approved - Book Hive".to_string(),
        html: Some(html),
        text: None,
    }
}

/// Borrow request rejected
pub fn rejection_email(to: &str, borrower_name: &str, titles: &str, admin_notes: Option<&str>) -> EmailMessage {
    let notes = admin_notes
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!("<p><strong>Note from the library:</strong> {}</p>\n", escape_html(n)))
        .unwrap_or_default();

    let html = format!(
        r#"<h1>Loan Request Update</h1>
<p>Hello {name},</p>
<p>Thank you for your interest in borrowing <strong>{titles}</strong> from our library.</p>
<p>We regret to inform you that your request could not be approved at this time. This may be due to high demand, unavailability, or other factors.</p>
{notes}<h4>What You Can Do</h4>
<ul>
<li>Check back later - the book might become available soon</li>
<li>Contact our library staff for more information</li>
<li>Browse our catalog for similar books</li>
</ul>
{signature}"#,
        name = escape_html(borrower_name),
        titles = escape_html(titles),
        notes = notes,
        signature = SIGNATURE,
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Loan Request Update - Book Hive".to_string(),
        html: Some(html),
        text: None,
    }
}

/// Loan returned
pub fn return_email(
    to: &str,
    borrower_name: &str,
    book_title: &str,
    returned_on: NaiveDate,
    late_fee: Decimal,
) -> EmailMessage {
    let fee = if late_fee > Decimal::ZERO {
        format!("<p><strong>Late Fee Due:</strong> ${:.2}</p>\n", late_fee)
    } else {
        String::new()
    };

    let html = format!(
        r#"<h1>Book Return Confirmed</h1>
<p>Dear {name},</p>
<p>Thank you for returning the book to our library!</p>
<h3>Return Details</h3>
<p><strong>Book Title:</strong> {title}</p>
<p><strong>Return Date:</strong> {date}</p>
{fee}<p>Your loan has been successfully closed. We hope you enjoyed reading this book!</p>
{signature}"#,
        name = escape_html(borrower_name),
        title = escape_html(book_title),
        date = format_date(returned_on),
        fee = fee,
        signature = SIGNATURE,
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Book Return Confirmed - {}", book_title),
        html: Some(html),
        text: None,
    }
}

/// Loan renewed
pub fn renewal_email(
    to: &str,
    borrower_name: &str,
    book_title: &str,
    previous_due: NaiveDate,
    new_due: NaiveDate,
    renewal_count: i32,
) -> EmailMessage {
    let html = format!(
        r#"<h1>Loan Renewal Confirmed</h1>
<p>Dear {name},</p>
<p>Great news! Your loan has been successfully renewed.</p>
<h3>Renewal Details</h3>
<p><strong>Book Title:</strong> {title}</p>
<p><strong>Previous Due Date:</strong> {previous}</p>
<p><strong>New Due Date:</strong> {new}</p>
<p><strong>Total Renewals:</strong> {count}</p>
<p>Please remember to return the book by the new due date to avoid any late fees.</p>
{signature}"#,
        name = escape_html(borrower_name),
        title = escape_html(book_title),
        previous = format_date(previous_due),
        new = format_date(new_due),
        count = renewal_count,
        signature = SIGNATURE,
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Loan Renewed - {}", book_title),
        html: Some(html),
        text: None,
    }
}

/// Loan past due, with the fee assessed so far
pub fn overdue_email(
    to: &str,
    borrower_name: &str,
    book_title: &str,
    authors: &[String],
    due_date: NaiveDate,
    days_overdue: i64,
    fee: Decimal,
) -> EmailMessage {
    let authors = if authors.is_empty() {
        "Unknown".to_string()
    } else {
        authors.join(", ")
    };

    let html = format!(
        r#"<h2>Overdue Book Notice</h2>
<p>Dear {name},</p>
<p>This is a reminder that the following book is now overdue:</p>
<h3>{title}</h3>
<p><strong>Author(s):</strong> {authors}</p>
<p><strong>Due Date:</strong> {due}</p>
<p><strong>Days Overdue:</strong> {days}</p>
<p><strong>Fine Amount:</strong> ${fee:.2}</p>
<p>Please return the book as soon as possible to avoid additional fines.</p>
<p>If you have already returned this book, please ignore this notice.</p>
<p>Thank you,<br>Book Hive Library Team</p>"#,
        name = escape_html(borrower_name),
        title = escape_html(book_title),
        authors = escape_html(&authors),
        due = format_date(due_date),
        days = days_overdue,
        fee = fee,
    );

    EmailMessage {
        to: to.to_string(),
        subject: "Overdue Book Notice - Book Hive Library".to_string(),
        html: Some(html),
        text: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_submission_email_addressed_to_requester() {
        let msg = submission_email("ada@example.org", "Ada", "Dune", 14, "Main desk");
        assert_eq!(msg.to, "ada@example.org");
        assert_eq!(msg.subject, "Borrow Request Submitted - Book Hive Library");
        let html = msg.html.unwrap();
        assert!(html.contains("Dear Ada"));
        assert!(html.contains("<strong>Duration:</strong> 14 days"));
        assert!(html.contains("Main desk"));
    }

    #[test]
    fn test_approval_email_lists_details() {
        let msg = approval_email("ada@example.org", "Ada", "Dune, Emma", date("2025-02-08"), "Main desk");
        let html = msg.html.unwrap();
        assert_eq!(msg.subject, "Loan Request Approved - Book Hive");
        assert!(html.contains("Dune, Emma"));
        assert!(html.contains("February 8, 2025"));
        assert!(html.contains("Main desk"));
    }

    #[test]
    fn test_templates_escape_user_input() {
        let msg = rejection_email("a@b.c", "<script>x</script>", "Dune", Some("Try again & soon"));
        let html = msg.html.unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Try again &amp; soon"));
    }

    #[test]
    fn test_rejection_without_notes() {
        let html = rejection_email("a@b.c", "Ada", "Dune", None).html.unwrap();
        assert!(!html.contains("Note from the library"));
    }

    #[test]
    fn test_overdue_email_shows_fee() {
        let msg = overdue_email(
            "ada@example.org",
            "Ada",
            "Dune",
            &["Frank Herbert".to_string()],
            date("2025-03-01"),
            5,
            Decimal::from(5),
        );
        let html = msg.html.unwrap();
        assert!(html.contains("<strong>Days Overdue:</strong> 5"));
        assert!(html.contains("$5.00"));
        assert!(html.contains("Frank Herbert"));
    }

    #[test]
    fn test_return_email_mentions_fee_only_when_due() {
        let on_time = return_email("a@b.c", "Ada", "Dune", date("2025-03-01"), Decimal::ZERO);
        assert!(!on_time.html.unwrap().contains("Late Fee"));
        assert_eq!(on_time.subject, "Book Return Confirmed - Dune");

        let late = return_email("a@b.c", "Ada", "Dune", date("2025-03-01"), Decimal::from(3));
        assert!(late.html.unwrap().contains("$3.00"));
    }

    #[test]
    fn test_renewal_email_dates() {
        let msg = renewal_email("a@b.c", "Ada", "Dune", date("2025-01-15"), date("2025-01-29"), 1);
        let html = msg.html.unwrap();
        assert!(html.contains("January 15, 2025"));
        assert!(html.contains("January 29, 2025"));
        assert_eq!(msg.subject, "Loan Renewed - Dune");
    }
}
