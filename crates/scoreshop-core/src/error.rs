//! Error Types

use thiserror::Error;

/// Result type alias for delivery operations
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised while resolving, composing or dispatching a delivery
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Asset could not be fetched, or the fetched content failed validation
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    /// Provider refused for a reason that may clear up (rate limit, timeout, outage)
    #[error("Transient delivery failure: {0}")]
    TransientDelivery(String),

    /// Provider refused for a reason a retry will not fix
    #[error("Permanent delivery failure: {0}")]
    PermanentDelivery(String),

    /// Recipient address is not a deliverable email address
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Idempotency ledger failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DeliveryError {
    /// Check if the upstream processor should re-deliver the event
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::AssetUnavailable(_)
                | DeliveryError::TransientDelivery(_)
                | DeliveryError::Storage(_)
        )
    }

    /// Stable reason code recorded for failed deliveries
    pub fn reason_code(&self) -> &'static str {
        match self {
            DeliveryError::AssetUnavailable(_) => "ASSET_UNAVAILABLE",
            DeliveryError::TransientDelivery(_) => "TRANSIENT_DELIVERY",
            DeliveryError::PermanentDelivery(_) => "PERMANENT_DELIVERY",
            DeliveryError::InvalidRecipient(_) => "INVALID_RECIPIENT",
            DeliveryError::Storage(_) => "STORAGE",
            DeliveryError::Config(_) => "CONFIG",
        }
    }

    /// Convert to a message safe to return to callers
    pub fn user_message(&self) -> &'static str {
        match self {
            DeliveryError::AssetUnavailable(_) => "The purchased file is temporarily unavailable.",
            DeliveryError::TransientDelivery(_) => "Email delivery is temporarily unavailable.",
            DeliveryError::PermanentDelivery(_) => "Email delivery was rejected.",
            DeliveryError::InvalidRecipient(_) => "Receipt email address is invalid.",
            DeliveryError::Storage(_) | DeliveryError::Config(_) => "An internal error occurred.",
        }
    }
}
