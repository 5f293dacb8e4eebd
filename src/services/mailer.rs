//! Outbound mail: the [`Mailer`] transport seam and its implementations.
//!
//! Account operations never talk to a transport directly. They render a
//! [`MailTemplate`] and push it onto the [`MailQueue`], whose worker owns
//! the [`Mailer`].

mod queue;
mod templates;

pub use queue::{Delivery, MailQueue, RetryPolicy};
pub use templates::MailTemplate;

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::MailConfig;

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Delivery timed out")]
    Timeout,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<(), MailError>;
}

/// Plain SMTP relay with optional credentials.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {e}", config.from_address)))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.smtp_host.as_str())
                .port(config.smtp_port)
                .timeout(Some(Duration::from_secs(config.timeout_seconds)));

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
    async fn send(&self, envelope: &Envelope) -> Result<(), MailError> {
        let to = envelope
            .to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {e}", envelope.to)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(envelope.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(envelope.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, envelope: &Envelope) -> Result<(), MailError> {
        // Bodies carry one-time codes.
        info!(
            to = %envelope.to,
            subject = %envelope.subject,
            "Mail delivery disabled, message not sent"
        );
        debug!(to = %envelope.to, "Unsent message body:\n{}", envelope.body);
        Ok(())
    }
}

/// Keeps every delivered envelope in memory.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Envelope>>,
    failures_left: Mutex<u32>,
    notify: Notify,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        *self
            .failures_left
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = count;
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits until an envelope matching `predicate` has been delivered.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Option<Envelope>
    where
        F: Fn(&Envelope) -> bool,
    {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if let Some(found) = self.sent().into_iter().rev().find(|e| predicate(e)) {
                    return found;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait).await.ok()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, envelope: &Envelope) -> Result<(), MailError> {
        {
            let mut failures = self
                .failures_left
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *failures > 0 {
                *failures -= 1;
                return Err(MailError::Transport("simulated failure".to_string()));
            }
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Picks the transport for the configuration: SMTP when enabled, the log otherwise.
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    if config.enabled {
        info!(host = %config.smtp_host, port = config.smtp_port, "SMTP mail delivery enabled");
        Ok(Arc::new(SmtpMailer::from_config(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}
