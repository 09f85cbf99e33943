//! Outbound mail.
//!
//! DESIGN
//! ======
//! Services depend on the `Mailer` trait, not on Resend, so tests can record
//! messages and a server without mail credentials keeps working. Delivery is
//! best-effort: `deliver` logs the outcome and reports it as a bool, and no
//! caller fails its own operation because an email did not go out.

use std::sync::Arc;

use async_trait::async_trait;
use resend_rs::Resend;
use resend_rs::types::CreateEmailBaseOptions;

use crate::config::MailConfig;
use crate::services::activity_log;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError>;
}

/// Resend-backed mailer.
pub struct ResendMailer {
    client: Resend,
    from: String,
}

impl ResendMailer {
    #[must_use]
    pub fn new(config: &MailConfig) -> Self {
        Self { client: Resend::new(&config.api_key), from: config.from.clone() }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let email = CreateEmailBaseOptions::new(&self.from, [to], subject).with_html(html);
        self.client
            .emails
            .send(email)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// Mailer used when no credentials are configured: logs and drops.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), MailError> {
        tracing::info!(to, subject, "mail disabled; message not sent");
        Ok(())
    }
}

/// Pick the mailer for the current configuration.
#[must_use]
pub fn from_config(config: Option<&MailConfig>) -> Arc<dyn Mailer> {
    match config {
        Some(cfg) => Arc::new(ResendMailer::new(cfg)),
        None => Arc::new(LogMailer),
    }
}

/// Send and log the outcome. Returns whether the message was accepted.
pub async fn deliver(mailer: &dyn Mailer, event: &str, to: &str, subject: &str, html: &str) -> bool {
    match mailer.send(to, subject, html).await {
        Ok(()) => {
            activity_log::log_email_event(event, to, subject, true, None);
            true
        }
        Err(e) => {
            let detail = e.to_string();
            activity_log::log_email_event(event, to, subject, false, Some(&detail));
            false
        }
    }
}

/// Minimal HTML escaping for values interpolated into mail bodies.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Wrap plain paragraphs in the shared mail layout.
#[must_use]
pub fn render_notification(heading: &str, paragraphs: &[String]) -> String {
    let body = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect::<String>();
    MAIL_LAYOUT
        .replace("{{HEADING}}", &escape_html(heading))
        .replace("{{BODY}}", &body)
}

const MAIL_LAYOUT: &str = include_str!("../../templates/notification.html");


#[cfg(test)]
#[path = "mail_test.rs"]
mod tests;
