//! Payment Confirmation Handler
//!
//! Turns an authenticated `payment_intent.succeeded` webhook into exactly
//! one receipt email carrying the purchased files.
//!
//! ```text
//! Received ─▶ Verified ─▶ Parsed ─┬─▶ Ignored
//!                                 ├─▶ Recipient-Missing
//!                                 └─▶ Delivering ─┬─▶ Delivered
//!                                                 └─▶ Delivery-Failed
//! ```
//!
//! The signature is checked before a single byte of the body is parsed.
//! The idempotency ledger is claimed before delivery and marked complete
//! only after the provider accepted the message; failures release the
//! claim so the processor's retry can try again.

use std::sync::Arc;
use std::time::Duration;

use scoreshop_core::{
    AssetResolver, Claim, DeliveryError, DeliveryReceipt, EmailAddress, EventKind,
    IdempotencyStore, Mailer, NotificationComposer, OrderLineItem, PaymentEvent,
};
use tokio::time::timeout;

use crate::error::{PaymentError, Result};
use crate::signature::SignatureVerifier;
use crate::webhook::{WebhookEvent, parse_event};

/// Upper bounds on the two blocking I/O steps of a delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryTimeouts {
    pub asset_fetch: Duration,
    pub send: Duration,
}

impl Default for DeliveryTimeouts {
    fn default() -> Self {
        Self {
            asset_fetch: Duration::from_secs(30),
            send: Duration::from_secs(30),
        }
    }
}

/// Terminal success states of [`PaymentConfirmationHandler::handle`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Event is not actionable; no side effects
    Ignored { event_id: String, event_type: String },

    /// Receipt email accepted by the provider
    Delivered {
        payment_id: String,
        receipt: DeliveryReceipt,
    },

    /// Payment was delivered by an earlier attempt; nothing re-sent
    AlreadyDelivered {
        payment_id: String,
        receipt: DeliveryReceipt,
    },
}

/// Webhook orchestrator: verify, parse, resolve, compose, send
pub struct PaymentConfirmationHandler {
    verifier: SignatureVerifier,
    resolver: Arc<dyn AssetResolver>,
    composer: NotificationComposer,
    mailer: Arc<dyn Mailer>,
    ledger: Arc<dyn IdempotencyStore>,
    timeouts: DeliveryTimeouts,
}

impl PaymentConfirmationHandler {
    pub fn new(
        verifier: SignatureVerifier,
        resolver: Arc<dyn AssetResolver>,
        mailer: Arc<dyn Mailer>,
        ledger: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            verifier,
            resolver,
            composer: NotificationComposer::default(),
            mailer,
            ledger,
            timeouts: DeliveryTimeouts::default(),
        }
    }

    pub fn with_composer(mut self, composer: NotificationComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_timeouts(mut self, timeouts: DeliveryTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Name of the active email provider
    pub fn mailer_name(&self) -> &str {
        self.mailer.name()
    }

    /// Handle one webhook request
    pub async fn handle(&self, raw_body: &[u8], signature_header: &str) -> Result<HandlerOutcome> {
        self.verifier.verify(raw_body, signature_header)?;

        let event = match parse_event(raw_body, signature_header)? {
            WebhookEvent::Payment(event) => event,
            WebhookEvent::Other { event_id, event_type } => {
                tracing::debug!(event_id = %event_id, event_type = %event_type, "Ignoring webhook event");
                return Ok(HandlerOutcome::Ignored { event_id, event_type });
            }
        };

        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.kind,
            payment_id = %event.payment_id,
            "Processing payment webhook"
        );

        match event.kind {
            EventKind::PaymentSucceeded => self.fulfil(event).await,
            EventKind::PaymentFailed => {
                tracing::warn!(payment_id = %event.payment_id, "Payment failed - nothing to deliver");
                Ok(Self::ignored(event))
            }
            EventKind::PaymentCanceled | EventKind::Other(_) => Ok(Self::ignored(event)),
        }
    }

    fn ignored(event: PaymentEvent) -> HandlerOutcome {
        HandlerOutcome::Ignored {
            event_id: event.event_id,
            event_type: event.kind.as_str().to_string(),
        }
    }

    async fn fulfil(&self, event: PaymentEvent) -> Result<HandlerOutcome> {
        let raw_recipient = event.receipt_email.as_deref().ok_or_else(|| {
            tracing::warn!(payment_id = %event.payment_id, "Email not provided in PaymentIntent");
            PaymentError::MissingRecipient {
                payment_id: event.payment_id.clone(),
            }
        })?;
        let recipient = EmailAddress::parse(raw_recipient)
            .map_err(|e| PaymentError::InvalidRecipient(e.to_string()))?;

        let token = match self.ledger.try_claim(&event.payment_id)? {
            Claim::Acquired(token) => token,
            Claim::Completed(receipt) => {
                tracing::info!(
                    payment_id = %event.payment_id,
                    event_id = %event.event_id,
                    "Payment already delivered - skipping"
                );
                return Ok(HandlerOutcome::AlreadyDelivered {
                    payment_id: event.payment_id,
                    receipt,
                });
            }
            Claim::InProgress => {
                tracing::info!(payment_id = %event.payment_id, "Delivery already in flight");
                return Err(PaymentError::DeliveryInProgress(event.payment_id));
            }
        };

        match self.deliver(&event).await {
            Ok(receipt) => {
                if let Err(e) = self.ledger.complete(&event.payment_id, &token, &receipt) {
                    // the mail is out; a failed ledger write must not turn into a retry
                    tracing::error!(payment_id = %event.payment_id, error = %e, "Failed to record delivery");
                }
                tracing::info!(
                    payment_id = %event.payment_id,
                    recipient = %recipient,
                    provider = %receipt.provider,
                    attachments = receipt.attachment_count,
                    "Receipt email sent"
                );
                Ok(HandlerOutcome::Delivered {
                    payment_id: event.payment_id,
                    receipt,
                })
            }
            Err(e) => {
                if let Err(release_err) = self.ledger.release(&event.payment_id, &token) {
                    tracing::error!(payment_id = %event.payment_id, error = %release_err, "Failed to release claim");
                }
                tracing::error!(
                    payment_id = %event.payment_id,
                    reason = e.reason_code(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Delivery failed"
                );
                Err(PaymentError::DeliveryFailed(e))
            }
        }
    }

    async fn deliver(&self, event: &PaymentEvent) -> std::result::Result<DeliveryReceipt, DeliveryError> {
        let items: Vec<OrderLineItem> = event.items.iter().map(OrderLineItem::new).collect();

        let assets = timeout(self.timeouts.asset_fetch, self.resolver.resolve(&items))
            .await
            .map_err(|_| {
                DeliveryError::AssetUnavailable(format!(
                    "asset fetch timed out after {:?}",
                    self.timeouts.asset_fetch
                ))
            })??;

        let notification = self.composer.compose(event, &assets)?;

        timeout(self.timeouts.send, self.mailer.send(&notification))
            .await
            .map_err(|_| {
                DeliveryError::TransientDelivery(format!(
                    "{} send timed out after {:?}",
                    self.mailer.name(),
                    self.timeouts.send
                ))
            })?
    }
}
