//! SMTP delivery for system notifications.
//!
//! Uses the SMTP settings from the main config file. When SMTP is not
//! configured the server falls back to `LogMailer`, which only records
//! what would have been sent.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use super::{EmailMessage, Mailer};
use crate::config::EmailConfig;

/// Sends plain-text mail through the configured SMTP relay
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message> {
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let mut builder = Message::builder().from(from).subject(&message.subject);
        for recipient in &message.recipients {
            let to: Mailbox = recipient.parse()?;
            builder = builder.to(to);
        }

        Ok(builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow!("SMTP host not configured"))?;

        let email = self.build_message(message)?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            recipients = message.recipients.len(),
            subject = %message.subject,
            "Email sent successfully"
        );
        Ok(())
    }
}

/// Logs messages instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::warn!(
            recipients = ?message.recipients,
            subject = %message.subject,
            "Email not configured, message not delivered"
        );
        Ok(())
    }
}

/// SMTP when a relay and sender are configured, otherwise the log-only mailer
pub fn mailer_from_config(config: &EmailConfig) -> Arc<dyn Mailer> {
    if config.is_configured() {
        tracing::info!(
            host = config.smtp_host.as_deref().unwrap_or_default(),
            port = config.smtp_port,
            "Sending mail via SMTP"
        );
        Arc::new(SmtpMailer::new(config.clone()))
    } else {
        tracing::warn!("SMTP is not configured; outgoing mail will only be logged");
        Arc::new(LogMailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> EmailConfig {
        EmailConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            from_address: Some("noreply@vand.test".to_string()),
            ..EmailConfig::default()
        }
    }

    fn message(recipients: &[&str]) -> EmailMessage {
        EmailMessage {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: "Cafe Vand Login Code".to_string(),
            body: "Welcome alice! Your login code is: 123456".to_string(),
        }
    }

    #[test]
    fn test_build_message_with_many_recipients() {
        let mailer = SmtpMailer::new(configured());
        let built = mailer
            .build_message(&message(&["a@vand.test", "b@vand.test"]))
            .unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();

        assert!(raw.contains("a@vand.test"));
        assert!(raw.contains("b@vand.test"));
        assert!(raw.contains("Subject: Cafe Vand Login Code"));
        assert!(raw.contains("From: \"Cafe Vand\" <noreply@vand.test>") || raw.contains("From: Cafe Vand <noreply@vand.test>"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mailer = SmtpMailer::new(configured());
        assert!(mailer.build_message(&message(&["not an address"])).is_err());
    }

    #[test]
    fn test_build_message_requires_sender() {
        let mailer = SmtpMailer::new(EmailConfig::default());
        assert!(mailer.build_message(&message(&["a@vand.test"])).is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_email_falls_back_to_log_mailer() {
        let mailer = mailer_from_config(&EmailConfig::default());
        assert!(mailer.send(&message(&["a@vand.test"])).await.is_ok());

        // Selecting the SMTP mailer does not touch the network
        let _smtp = mailer_from_config(&configured());
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        assert!(LogMailer.send(&message(&["a@vand.test"])).await.is_ok());
    }
}
