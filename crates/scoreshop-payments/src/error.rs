//! Payment Error Types

use scoreshop_core::DeliveryError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Webhook signature missing, forged, stale, or no secret configured
    #[error("Webhook authentication failed: {0}")]
    Authentication(String),

    /// Verified body does not match the event schema
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Succeeded payment carries no receipt email
    #[error("Missing receipt email for payment {payment_id}")]
    MissingRecipient { payment_id: String },

    /// Receipt email present but not an address
    #[error("Invalid receipt email: {0}")]
    InvalidRecipient(String),

    /// Another attempt for the same payment is still delivering
    #[error("Delivery already in progress for payment {0}")]
    DeliveryInProgress(String),

    /// Asset fetch or email delivery failed
    #[error("Delivery failed: {0}")]
    DeliveryFailed(#[from] DeliveryError),

    /// Charge request rejected before reaching Stripe
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if the caller should signal the processor to retry
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::DeliveryInProgress(_) | PaymentError::Stripe(_) => true,
            PaymentError::DeliveryFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Authentication(_) => "AUTHENTICATION_FAILED",
            PaymentError::MalformedEvent(_) => "MALFORMED_EVENT",
            PaymentError::MissingRecipient { .. } => "MISSING_RECIPIENT",
            PaymentError::InvalidRecipient(_) => "INVALID_RECIPIENT",
            PaymentError::DeliveryInProgress(_) => "DELIVERY_IN_PROGRESS",
            PaymentError::DeliveryFailed(inner) => inner.reason_code(),
            PaymentError::InvalidRequest(_) => "INVALID_REQUEST",
            PaymentError::Stripe(_) => "STRIPE_ERROR",
            PaymentError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Authentication(_) => "Webhook signature verification failed.",
            PaymentError::MalformedEvent(_) => "Webhook payload could not be parsed.",
            PaymentError::MissingRecipient { .. } => "Email not provided in PaymentIntent.",
            PaymentError::InvalidRecipient(_) => "Receipt email address is invalid.",
            PaymentError::DeliveryInProgress(_) => "Delivery for this payment is already in progress.",
            PaymentError::DeliveryFailed(inner) => inner.user_message(),
            PaymentError::InvalidRequest(msg) => msg,
            PaymentError::Stripe(_) => "Payment processing failed. Please try again.",
            PaymentError::Config(_) => "Service configuration error.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(!PaymentError::Authentication("bad".into()).is_retryable());
        assert!(!PaymentError::MalformedEvent("bad".into()).is_retryable());
        assert!(!PaymentError::MissingRecipient { payment_id: "pi_1".into() }.is_retryable());
        assert!(PaymentError::DeliveryInProgress("pi_1".into()).is_retryable());
        assert!(PaymentError::from(DeliveryError::AssetUnavailable("404".into())).is_retryable());
        assert!(!PaymentError::from(DeliveryError::PermanentDelivery("550".into())).is_retryable());
    }

    #[test]
    fn test_delivery_code_passthrough() {
        let err = PaymentError::from(DeliveryError::TransientDelivery("429".into()));
        assert_eq!(err.code(), "TRANSIENT_DELIVERY");
        assert_eq!(PaymentError::InvalidRequest("Email is required".into()).user_message(), "Email is required");
    }
}
