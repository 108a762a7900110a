//! Email delivery through SMTP, or logged only when delivery is disabled

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use uuid::Uuid;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::notification::EmailMessage,
};

/// Delivers a fully built message
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> AppResult<()>;
}

/// SMTP delivery with `lettre`
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, message: &EmailMessage) -> AppResult<Message> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Book Hive Library");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(&message.to)
            .map_err(|e| AppError::BadRequest(format!("Invalid recipient address: {}", e)))?;

        let text = message.text_body();
        let builder = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&message.subject);

        let email = match message.html {
            Some(ref html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            None => builder.header(ContentType::TEXT_PLAIN).body(text),
        }
        .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        Ok(email)
    }

    fn transport(&self) -> AppResult<SmtpTransport> {
        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        Ok(mailer_builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, message: &EmailMessage) -> AppResult<()> {
        let email = self.build_message(message)?;
        let transport = self.transport()?;

        // SmtpTransport blocks on network I/O
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

/// Logs messages instead of sending them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, message: &EmailMessage) -> AppResult<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email delivery disabled, message logged only"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        let mailer: Arc<dyn Mailer> = if config.enabled {
            Arc::new(SmtpMailer::new(config))
        } else {
            Arc::new(LogMailer)
        };
        Self { mailer }
    }

    pub fn with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Send a message and return its delivery id
    pub async fn send(&self, message: &EmailMessage) -> AppResult<Uuid> {
        if message.html.is_none() && message.text.is_none() {
            return Err(AppError::Validation("Email needs an html or text body".to_string()));
        }

        self.mailer.deliver(message).await?;

        let email_id = Uuid::new_v4();
        tracing::info!(email_id = %email_id, to = %message.to, subject = %message.subject, "Email sent");
        Ok(email_id)
    }

    /// Send without failing the caller; errors are logged
    pub async fn send_best_effort(&self, message: &EmailMessage) -> Option<Uuid> {
        match self.send(message).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(to = %message.to, subject = %message.subject, error = %e, "Email could not be sent");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "ada@example.org".to_string(),
            subject: "Borrow Request Approved".to_string(),
            html: Some("<p>Approved</p>".to_string()),
            text: None,
        }
    }

    #[tokio::test]
    async fn test_send_delivers_through_mailer() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_deliver()
            .withf(|m| m.to == "ada@example.org")
            .times(1)
            .returning(|_| Ok(()));

        let service = EmailService::with_mailer(Arc::new(mailer));
        assert!(service.send(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_rejects_empty_body() {
        let mut mailer = MockMailer::new();
        mailer.expect_deliver().times(0);

        let service = EmailService::with_mailer(Arc::new(mailer));
        let mut empty = message();
        empty.html = None;
        assert!(matches!(service.send(&empty).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_deliver()
            .returning(|_| Err(AppError::Internal("smtp down".to_string())));

        let service = EmailService::with_mailer(Arc::new(mailer));
        assert!(service.send_best_effort(&message()).await.is_none());
    }

    #[test]
    fn test_smtp_message_build_rejects_bad_recipient() {
        let config = EmailConfig {
            enabled: true,
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            smtp_username: None,
            smtp_password: None,
            smtp_from: "noreply@bookhive.org".to_string(),
            smtp_from_name: None,
            smtp_use_tls: false,
            max_attempts: 3,
        };
        let mailer = SmtpMailer::new(config);

        assert!(mailer.build_message(&message()).is_ok());

        let mut bad = message();
        bad.to = "not an address".to_string();
        assert!(matches!(mailer.build_message(&bad), Err(AppError::BadRequest(_))));
    }
}
