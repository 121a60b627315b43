//! Payment Events
//!
//! The processor-agnostic view of a payment confirmation. Parsing the
//! processor's wire envelope lives with the webhook code; everything after
//! signature verification works on these types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of payment event delivered by the processor
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `payment_intent.succeeded`, the only actionable kind
    PaymentSucceeded,

    /// `payment_intent.payment_failed`
    PaymentFailed,

    /// `payment_intent.canceled`
    PaymentCanceled,

    /// Anything else the processor sends to the endpoint
    Other(String),
}

impl EventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => EventKind::PaymentSucceeded,
            "payment_intent.payment_failed" => EventKind::PaymentFailed,
            "payment_intent.canceled" => EventKind::PaymentCanceled,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PaymentSucceeded => "payment_intent.succeeded",
            EventKind::PaymentFailed => "payment_intent.payment_failed",
            EventKind::PaymentCanceled => "payment_intent.canceled",
            EventKind::Other(event_type) => event_type,
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, EventKind::PaymentSucceeded)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verified payment event
///
/// Immutable once built. The handler owns it for the duration of one
/// webhook request and nothing retains it afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Processor event ID (unique per delivery attempt from the source)
    pub event_id: String,

    /// Event kind
    pub kind: EventKind,

    /// Processor payment ID (unique per charge)
    pub payment_id: String,

    /// Amount in minor currency units
    pub amount: i64,

    /// ISO currency code as sent by the processor (usually lowercase)
    pub currency: String,

    /// Buyer email the receipt goes to
    pub receipt_email: Option<String>,

    /// When the payment was created
    pub created_at: DateTime<Utc>,

    /// Purchased catalog SKUs (empty = catalog default)
    #[serde(default)]
    pub items: Vec<String>,

    /// Buyer name captured at checkout
    #[serde(default)]
    pub customer_name: Option<String>,

    /// Signature header the event arrived with
    #[serde(default)]
    pub signature_header: String,
}

impl PaymentEvent {
    /// Amount as major units with two decimals, e.g. `1000` -> `"10.00"`
    pub fn formatted_amount(&self) -> String {
        Decimal::new(self.amount, 2).round_dp(2).to_string()
    }

    /// Upper-cased currency code
    pub fn currency_code(&self) -> String {
        self.currency.to_uppercase()
    }

    /// Human-readable total, e.g. `USD 10.00`
    pub fn display_total(&self) -> String {
        format!("{} {}", self.currency_code(), self.formatted_amount())
    }
}
