//! Fire-and-forget email notifications.
//!
//! Callers enqueue a message and return immediately. A background worker
//! hands every message to its own task, so delivery order across messages is
//! not guaranteed and a slow SMTP relay never holds up a request. Delivery
//! failures are logged and dropped.

mod email;

pub use email::*;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;

use crate::db::Account;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound email primitive
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "Info"),
            AlertLevel::Warning => write!(f, "Warning"),
        }
    }
}

/// Message bodies for the login flow.
#[derive(Debug, Clone)]
pub struct Notices {
    site_name: String,
}

impl Notices {
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
        }
    }

    pub fn otp_code(&self, email: &str, username: &str, code: &str) -> EmailMessage {
        EmailMessage {
            recipients: vec![email.to_string()],
            subject: format!("{} Login Code", self.site_name),
            body: format!("Welcome {}! Your login code is: {}", username, code),
        }
    }

    pub fn login_notice(&self, email: &str, username: &str) -> EmailMessage {
        EmailMessage {
            recipients: vec![email.to_string()],
            subject: format!("{} Login Alert", self.site_name),
            body: format!(
                "Dear {}, you have been logged in to the {} website. If this action was not initiated by you, please contact the website administrator immediately.",
                username, self.site_name
            ),
        }
    }

    pub fn admin_alert(
        &self,
        recipients: Vec<String>,
        level: AlertLevel,
        event: &str,
        username: &str,
    ) -> EmailMessage {
        EmailMessage {
            recipients,
            subject: format!("{} Admins Alert!", self.site_name),
            body: format!(
                "{}:{} | Detail:user={} | Date:{}",
                level,
                event,
                username,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<EmailMessage>,
    notices: Notices,
}

impl NotificationDispatcher {
    /// Spawn the delivery worker and return a handle to it.
    pub fn start(mailer: Arc<dyn Mailer>, notices: Notices) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(mailer, rx));
        Self { tx, notices }
    }

    /// A dispatcher without a worker. Messages pile up in the returned receiver.
    #[cfg(test)]
    pub fn detached(notices: Notices) -> (Self, mpsc::UnboundedReceiver<EmailMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, notices }, rx)
    }

    /// Enqueue a message. Never blocks and never fails the caller.
    pub fn send(&self, message: EmailMessage) {
        if message.recipients.is_empty() {
            tracing::debug!(subject = %message.subject, "No recipients, notification skipped");
            return;
        }
        if let Err(e) = self.tx.send(message) {
            tracing::error!(subject = %e.0.subject, "Notification worker is gone, message dropped");
        }
    }

    pub fn send_otp_code(&self, account: &Account, code: &str) {
        match account.email.as_deref() {
            Some(email) if !email.is_empty() => {
                self.send(self.notices.otp_code(email, &account.username, code))
            }
            _ => tracing::warn!(
                username = %account.username,
                "Account has no email address, OTP code not delivered"
            ),
        }
    }

    pub fn send_login_notice(&self, account: &Account) {
        match account.email.as_deref() {
            Some(email) if !email.is_empty() => {
                self.send(self.notices.login_notice(email, &account.username))
            }
            _ => tracing::debug!(
                username = %account.username,
                "Account has no email address, login notice skipped"
            ),
        }
    }

    pub fn send_admin_alert(
        &self,
        recipients: Vec<String>,
        level: AlertLevel,
        event: &str,
        username: &str,
    ) {
        self.send(self.notices.admin_alert(recipients, level, event, username));
    }
}

async fn run_worker(mailer: Arc<dyn Mailer>, mut rx: mpsc::UnboundedReceiver<EmailMessage>) {
    tracing::info!("Notification worker started");

    while let Some(message) = rx.recv().await {
        let mailer = mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&message).await {
                tracing::error!(
                    subject = %message.subject,
                    recipients = message.recipients.len(),
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        });
    }

    tracing::info!("Notification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &EmailMessage) -> Result<()> {
            anyhow::bail!("relay refused connection")
        }
    }

    fn account(email: Option<&str>) -> Account {
        Account {
            id: "acc-1".to_string(),
            username: "alice".to_string(),
            email: email.map(str::to_string),
            password_hash: String::new(),
            is_active: true,
            is_staff: true,
            is_superuser: false,
            last_login_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_notice_texts() {
        let notices = Notices::new("Cafe Vand");

        let otp = notices.otp_code("alice@vand.test", "alice", "042137");
        assert_eq!(otp.subject, "Cafe Vand Login Code");
        assert_eq!(otp.body, "Welcome alice! Your login code is: 042137");

        let notice = notices.login_notice("alice@vand.test", "alice");
        assert!(notice
            .body
            .starts_with("Dear alice, you have been logged in to the Cafe Vand website."));

        let alert = notices.admin_alert(
            vec!["root@vand.test".to_string()],
            AlertLevel::Warning,
            "User has been banned for too many failed login attempts",
            "bob",
        );
        assert_eq!(alert.subject, "Cafe Vand Admins Alert!");
        assert!(alert
            .body
            .starts_with(
                "Warning:User has been banned for too many failed login attempts | Detail:user=bob | Date:"
            ));
    }

    #[test]
    fn test_account_without_email_is_skipped() {
        let (dispatcher, mut rx) = NotificationDispatcher::detached(Notices::new("Cafe Vand"));
        dispatcher.send_otp_code(&account(None), "123456");
        dispatcher.send_login_notice(&account(Some("")));
        dispatcher.send_admin_alert(vec![], AlertLevel::Info, "event", "alice");
        assert!(rx.try_recv().is_err());

        dispatcher.send_login_notice(&account(Some("alice@vand.test")));
        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.recipients, vec!["alice@vand.test".to_string()]);
    }

    #[tokio::test]
    async fn test_worker_delivers_messages() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = NotificationDispatcher::start(mailer.clone(), Notices::new("Cafe Vand"));

        dispatcher.send_otp_code(&account(Some("alice@vand.test")), "111222");
        dispatcher.send_login_notice(&account(Some("alice@vand.test")));

        for _ in 0..50 {
            if mailer.sent.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|m| m.body.contains("111222")));
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_reach_caller() {
        let dispatcher =
            NotificationDispatcher::start(Arc::new(FailingMailer), Notices::new("Cafe Vand"));
        dispatcher.send_login_notice(&account(Some("alice@vand.test")));
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.send_login_notice(&account(Some("alice@vand.test")));
    }
}
