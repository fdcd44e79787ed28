//! Hand-off point to the email delivery collaborator.
//!
//! The auth core decides that a message is sent and what it carries; delivery
//! itself belongs to whatever implements [`EmailSender`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

/// Delivery failures reported by an [`EmailSender`].
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// The transport refused or could not reach the relay.
    #[error("mail transport failed: {0}")]
    Transport(String),

    /// The destination was rejected.
    #[error("rejected recipient: {0}")]
    Rejected(String),
}

/// A sign-in link ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLinkEmail {
    /// Normalized destination address.
    pub to: String,
    /// Absolute link carrying the raw token.
    pub link: String,
    /// When the link stops working.
    pub expires_at: DateTime<Utc>,
}

impl MagicLinkEmail {
    /// Raw token carried in the link's query string, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.link
            .split_once("token=")
            .map(|(_, rest)| rest.split('&').next().unwrap_or(rest))
    }
}

/// Email delivery collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync + std::fmt::Debug {
    /// Deliver a sign-in link.
    ///
    /// # Errors
    ///
    /// Returns error if the message could not be handed to the transport.
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), MailError>;
}

/// Sender that only writes to the log. Used when no relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMailer;

#[async_trait]
impl EmailSender for TracingMailer {
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), MailError> {
        tracing::info!(
            scope = "auth.login",
            to = %message.to,
            expires_at = %message.expires_at,
            "magic link ready for delivery"
        );
        // Links are credentials; keep them out of default log levels.
        tracing::debug!(scope = "auth.login", link = %message.link, "magic link");
        Ok(())
    }
}

/// Sender that keeps every message in memory.
#[derive(Debug)]
pub struct OutboxMailer {
    sent: Mutex<Vec<MagicLinkEmail>>,
    delivered: watch::Sender<usize>,
}

impl Default for OutboxMailer {
    fn default() -> Self {
        let (delivered, _) = watch::channel(0);
        Self {
            sent: Mutex::new(Vec::new()),
            delivered,
        }
    }
}

impl OutboxMailer {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<MagicLinkEmail> {
        self.sent.lock().clone()
    }

    /// Drain the outbox.
    pub fn take(&self) -> Vec<MagicLinkEmail> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Most recent message, if any.
    #[must_use]
    pub fn last(&self) -> Option<MagicLinkEmail> {
        self.sent.lock().last().cloned()
    }

    /// Messages delivered since creation, including drained ones.
    #[must_use]
    pub fn delivered(&self) -> usize {
        *self.delivered.borrow()
    }

    /// Wait until at least `count` messages have been delivered since
    /// creation, then return the current outbox.
    pub async fn wait_for(&self, count: usize) -> Vec<MagicLinkEmail> {
        let mut delivered = self.delivered.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = delivered.wait_for(|n| *n >= count).await;
        self.sent()
    }
}

#[async_trait]
impl EmailSender for OutboxMailer {
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), MailError> {
        self.sent.lock().push(message.clone());
        self.delivered.send_modify(|n| *n += 1);
        Ok(())
    }
}
