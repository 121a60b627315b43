//! Outbound Notifications
//!
//! The provider-neutral email built by the composer and handed to a
//! delivery gateway.

use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::asset::DeliverableAsset;
use crate::error::{DeliveryError, Result};

/// Syntactically valid email address
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse and validate an address
    ///
    /// Syntax is checked by `validator` (HTML5 / RFC 5322 subset); on top of
    /// that the domain must be dotted and the whole address at most 254
    /// bytes. Deliverability is the provider's call.
    pub fn parse(raw: &str) -> Result<Self> {
        let address = raw.trim();
        let invalid = |why: &str| DeliveryError::InvalidRecipient(format!("{address:?}: {why}"));

        if address.is_empty() {
            return Err(invalid("empty"));
        }
        if address.len() > 254 {
            return Err(invalid("too long"));
        }
        if !address.to_string().validate_email() {
            return Err(invalid("not a valid email address"));
        }

        let domain = address.rsplit_once('@').map_or("", |(_, domain)| domain);
        if !domain.contains('.') || domain.starts_with('[') {
            return Err(invalid("bad domain"));
        }

        Ok(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = DeliveryError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully composed email, ready for a gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundNotification {
    /// Validated recipient
    pub recipient: EmailAddress,

    pub subject: String,

    /// Plain text body
    pub body_text: String,

    /// HTML alternative
    pub body_html: Option<String>,

    /// Attachments in delivery order
    pub attachments: Vec<DeliverableAsset>,

    /// Payment this notification fulfils
    pub payment_id: String,
}
