//! Outgoing Mail
//!
//! Login codes travel out-of-band by email. SMTP delivery is used when a
//! relay is configured; otherwise messages are written to the log.

use crate::config::MailConfig;
use crate::error::AuthError;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

/// A plain-text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// The login code email
    pub fn login_code(to: &str, code: &str, ttl_seconds: i64) -> Self {
        let minutes = (ttl_seconds / 60).max(1);
        Self {
            to: to.to_string(),
            subject: "Your login code".to_string(),
            body: format!(
                "Your login code is {}.\n\nIt is valid for {} minutes. \
                 If you did not try to sign in, you can ignore this email.",
                code, minutes
            ),
        }
    }
}

/// Mail delivery backend
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AuthError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AuthError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "SMTP not configured, mail written to log"
        );
        Ok(())
    }
}

/// SMTP delivery over a STARTTLS relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig, host: &str) -> Result<Self, AuthError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| AuthError::Config(format!("MAIL_FROM is not a valid address: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AuthError::Config(format!("Invalid SMTP relay: {}", e)))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), AuthError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| AuthError::Mail(format!("invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| AuthError::Mail(e.to_string()))?;

        self.transport.send(message).await.map_err(|e| {
            tracing::error!("SMTP delivery failed: {:?}", e);
            AuthError::Mail(e.to_string())
        })?;

        Ok(())
    }
}

/// Pick the mail backend for the given configuration
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, AuthError> {
    match &config.smtp_host {
        Some(host) => {
            tracing::info!(host = %host, port = config.smtp_port, "Using SMTP mail delivery");
            Ok(Arc::new(SmtpMailer::new(config, host)?))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, login codes will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_code_message() {
        let mail = OutgoingMail::login_code("erin@example.com", "123456", 300);
        assert_eq!(mail.to, "erin@example.com");
        assert_eq!(mail.subject, "Your login code");
        assert!(mail.body.contains("123456"));
        assert!(mail.body.contains("5 minutes"));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let mail = OutgoingMail::login_code("frank@example.com", "654321", 300);
        assert!(LogMailer.send(mail).await.is_ok());
    }

    #[test]
    fn test_backend_selection_without_smtp() {
        let config = MailConfig {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: "no-reply@example.com".into(),
        };
        assert!(from_config(&config).is_ok());
    }
}
