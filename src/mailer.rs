//! Outgoing email. Delivery is behind [`Mailer`]; the shipped
//! implementations log or record messages instead of talking SMTP.

use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Writes each message to the log.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Email queued (log transport)"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::Delivery("mailbox lock poisoned".into()))?
            .push(message.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════
// Message templates
// ═══════════════════════════════════════════

pub fn password_reset_email(to: &str, name: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your CareConnect password".to_string(),
        body: format!(
            "Hello {name},\n\nUse the link below to choose a new password. \
             It expires in {} minutes.\n\n{link}\n\nIf you did not ask for this, ignore this email.",
            crate::config::RESET_TOKEN_TTL_MINUTES
        ),
    }
}

pub fn report_uploaded_email(
    to: &str,
    patient_name: &str,
    doctor_name: &str,
    file_names: &[String],
) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "New medical report added to your record".to_string(),
        body: format!(
            "Hello {patient_name},\n\nDr. {doctor_name} uploaded {} report(s) to your record:\n{}",
            file_names.len(),
            file_names
                .iter()
                .map(|n| format!("  - {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        ),
    }
}
