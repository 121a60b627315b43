//! Stripe Webhook Events
//!
//! Parses a verified webhook body into the processor-agnostic
//! [`PaymentEvent`]. Callers must verify the signature first; nothing here
//! looks at the header beyond carrying it along.

use chrono::{TimeZone, Utc};
use scoreshop_core::{EventKind, PaymentEvent};
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{PaymentError, Result};

/// Metadata key holding comma-separated catalog SKUs
pub const METADATA_ITEMS: &str = "items";

/// Metadata key holding the buyer's name
pub const METADATA_CUSTOMER_NAME: &str = "customer_name";

/// Metadata key holding the buyer's country
pub const METADATA_COUNTRY: &str = "country";

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A `payment_intent.*` event
    Payment(PaymentEvent),

    /// Unhandled event type
    Other { event_id: String, event_type: String },
}

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt_email: Option<String>,
    created: i64,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Parse a verified webhook body
///
/// `payment_intent.succeeded` must carry a complete payment intent or the
/// event is malformed. Other `payment_intent.*` kinds are parsed when they
/// can be and otherwise reported as [`WebhookEvent::Other`].
pub fn parse_event(payload: &[u8], signature_header: &str) -> Result<WebhookEvent> {
    let envelope: EventEnvelope = serde_json::from_slice(payload)
        .map_err(|e| PaymentError::MalformedEvent(format!("invalid event envelope: {e}")))?;

    let kind = EventKind::from_type(&envelope.event_type);
    if !envelope.event_type.starts_with("payment_intent.") {
        return Ok(WebhookEvent::Other {
            event_id: envelope.id,
            event_type: envelope.event_type,
        });
    }

    let intent = match serde_json::from_value::<PaymentIntentObject>(envelope.data.object) {
        Ok(intent) => intent,
        Err(e) if kind.is_actionable() => {
            return Err(PaymentError::MalformedEvent(format!(
                "invalid payment intent in {}: {e}",
                envelope.id
            )));
        }
        Err(_) => {
            return Ok(WebhookEvent::Other {
                event_id: envelope.id,
                event_type: envelope.event_type,
            });
        }
    };

    let created_at = Utc
        .timestamp_opt(intent.created, 0)
        .single()
        .ok_or_else(|| PaymentError::MalformedEvent(format!("invalid created timestamp {}", intent.created)))?;

    if intent.amount < 0 {
        return Err(PaymentError::MalformedEvent(format!(
            "negative amount {} on {}",
            intent.amount, intent.id
        )));
    }

    let items = intent
        .metadata
        .get(METADATA_ITEMS)
        .map(|items| {
            items
                .split(',')
                .map(str::trim)
                .filter(|sku| !sku.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(WebhookEvent::Payment(PaymentEvent {
        event_id: envelope.id,
        kind,
        payment_id: intent.id,
        amount: intent.amount,
        currency: intent.currency,
        receipt_email: intent
            .receipt_email
            .filter(|email| !email.trim().is_empty()),
        created_at,
        items,
        customer_name: intent.metadata.get(METADATA_CUSTOMER_NAME).cloned(),
        signature_header: signature_header.to_string(),
    }))
}
