//! Delivery Gateway
//!
//! Common interface for transactional-email providers (SMTP, SendGrid, ...)
//! so the confirmation handler never depends on a specific one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::{DeliveryError, Result};
use crate::notification::OutboundNotification;

/// Successful hand-off of a notification to a provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider name ("smtp", "sendgrid", ...)
    pub provider: String,

    /// Provider-side message reference, when one is returned
    pub message_id: Option<String>,

    /// Address the message was accepted for
    pub recipient: String,

    /// Number of files attached
    pub attachment_count: usize,

    /// When the provider accepted the message
    pub accepted_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn accepted(
        provider: impl Into<String>,
        message_id: Option<String>,
        notification: &OutboundNotification,
    ) -> Self {
        Self {
            provider: provider.into(),
            message_id,
            recipient: notification.recipient.to_string(),
            attachment_count: notification.attachments.len(),
            accepted_at: Utc::now(),
        }
    }
}

/// Strategy trait for email providers
///
/// Implementations map provider failures onto
/// [`DeliveryError::TransientDelivery`] (rate limits, timeouts, outages)
/// or [`DeliveryError::PermanentDelivery`] (rejected recipient, bad
/// credentials).
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a notification with its attachments
    async fn send(&self, notification: &OutboundNotification) -> Result<DeliveryReceipt>;

    /// Provider name, for logs and receipts
    fn name(&self) -> &str;
}

/// In-memory mailer that records everything it is asked to send
///
/// For development and tests.
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundNotification>>,
}

impl Default for MemoryMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Everything sent so far, oldest first
    pub fn sent(&self) -> Vec<OutboundNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, notification: &OutboundNotification) -> Result<DeliveryReceipt> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| DeliveryError::TransientDelivery("mailbox lock poisoned".into()))?;
        sent.push(notification.clone());

        Ok(DeliveryReceipt::accepted(
            self.name(),
            Some(uuid::Uuid::new_v4().to_string()),
            notification,
        ))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
