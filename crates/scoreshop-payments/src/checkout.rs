//! Stripe Charge Creation
//!
//! Implements the "Stripe Elements (Embedded)" approach: the server creates a
//! PaymentIntent and hands its client secret to the storefront, which
//! completes card authentication in the browser.

use async_trait::async_trait;
use rust_decimal::Decimal;
use scoreshop_core::{Catalog, EmailAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use stripe::{Client, CreatePaymentIntent, Currency, PaymentIntent};

use crate::error::{PaymentError, Result};
use crate::signature::{DEFAULT_TOLERANCE_SECS, SignatureVerifier};
use crate::webhook::{METADATA_COUNTRY, METADATA_CUSTOMER_NAME, METADATA_ITEMS};

/// Stripe credentials and webhook settings
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish()
    }
}

impl StripeConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from a key lookup (environment, test map, ...)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| PaymentError::Config(format!("{key} not set")))
        };

        let webhook_tolerance_secs = match lookup("WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| PaymentError::Config(format!("WEBHOOK_TOLERANCE_SECS invalid: {raw}")))?,
            None => DEFAULT_TOLERANCE_SECS,
        };

        Ok(Self {
            secret_key: required("STRIPE_SECRET_KEY")?,
            webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            webhook_tolerance_secs,
        })
    }

    /// Verifier for the webhook endpoint
    pub fn webhook_verifier(&self) -> SignatureVerifier {
        SignatureVerifier::new(self.webhook_secret.clone()).with_tolerance(self.webhook_tolerance_secs)
    }
}

/// A storefront cart line
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CartItem {
    /// Catalog SKU, when the storefront knows it
    #[serde(default)]
    pub sku: Option<String>,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Client-side price in major units (informational only)
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Charge request from the storefront
///
/// Accepts both `{email}` and `{email, amount, cartItems, name, country}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    #[serde(default)]
    pub email: Option<String>,

    /// Client-computed total in major units; the server never charges it
    #[serde(default)]
    pub amount: Option<Decimal>,

    #[serde(default)]
    pub cart_items: Vec<CartItem>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub country: Option<String>,
}

/// Server-priced charge derived from a request and the catalog
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeQuote {
    /// Total in minor units
    pub amount: i64,
    pub currency: String,
    pub receipt_email: EmailAddress,
    /// Distinct SKUs, in cart order
    pub skus: Vec<String>,
    pub customer_name: Option<String>,
    pub country: Option<String>,
    pub description: String,
}

impl ChargeQuote {
    /// Price a request against the catalog
    pub fn for_request(catalog: &Catalog, request: &ChargeRequest) -> Result<Self> {
        let email = request
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| PaymentError::InvalidRequest("Email is required".into()))?;
        let receipt_email = EmailAddress::parse(email)
            .map_err(|_| PaymentError::InvalidRequest("Email is invalid".into()))?;

        let mut lines = Vec::new();
        for cart_item in &request.cart_items {
            let key = cart_item
                .sku
                .as_deref()
                .or(cart_item.name.as_deref())
                .ok_or_else(|| PaymentError::InvalidRequest("Cart item has no sku or name".into()))?;
            let item = catalog
                .find(key)
                .ok_or_else(|| PaymentError::InvalidRequest(format!("Unknown item: {key}")))?;
            lines.push(item);
        }
        if lines.is_empty() {
            let item = catalog
                .default_item()
                .ok_or_else(|| PaymentError::Config("catalog has no default item".into()))?;
            lines.push(item);
        }

        let amount = lines
            .iter()
            .try_fold(0_i64, |total, item| total.checked_add(item.price))
            .ok_or_else(|| PaymentError::InvalidRequest("Order total overflows".into()))?;
        if amount <= 0 {
            return Err(PaymentError::InvalidRequest("Order total must be positive".into()));
        }

        if let Some(client_amount) = request.amount {
            let server_amount = Decimal::new(amount, 2);
            if client_amount != server_amount {
                tracing::warn!(
                    client_amount = %client_amount,
                    server_amount = %server_amount,
                    "Client total differs from catalog price - charging catalog price"
                );
            }
        }

        let mut skus: Vec<String> = Vec::new();
        for item in &lines {
            if !skus.contains(&item.sku) {
                skus.push(item.sku.clone());
            }
        }

        let description = lines
            .iter()
            .map(|item| item.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            amount,
            currency: catalog.currency.to_lowercase(),
            receipt_email,
            skus,
            customer_name: request.name.clone().filter(|n| !n.trim().is_empty()),
            country: request.country.clone().filter(|c| !c.trim().is_empty()),
            description,
        })
    }

    /// Metadata written onto the PaymentIntent and read back by the webhook
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_ITEMS.to_string(), self.skus.join(","));
        if let Some(name) = &self.customer_name {
            metadata.insert(METADATA_CUSTOMER_NAME.to_string(), name.clone());
        }
        if let Some(country) = &self.country {
            metadata.insert(METADATA_COUNTRY.to_string(), country.clone());
        }
        metadata
    }
}

/// Client-usable authorization for a created charge
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeAuthorization {
    pub payment_id: String,
    pub client_secret: String,
}

/// Charge creation capability
#[async_trait]
pub trait ChargeInitiator: Send + Sync {
    /// Create a payment authorization for a quote
    async fn create_charge(&self, quote: &ChargeQuote) -> Result<ChargeAuthorization>;
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
        }
    }
}

#[async_trait]
impl ChargeInitiator for StripeClient {
    async fn create_charge(&self, quote: &ChargeQuote) -> Result<ChargeAuthorization> {
        let currency = Currency::from_str(&quote.currency)
            .map_err(|_| PaymentError::Config(format!("unsupported currency {}", quote.currency)))?;

        let mut params = CreatePaymentIntent::new(quote.amount, currency);
        params.receipt_email = Some(quote.receipt_email.as_str());
        params.payment_method_types = Some(vec!["card".to_string()]);
        params.description = Some(&quote.description);
        params.metadata = Some(quote.metadata());

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Stripe("No client secret returned".into()))?;

        tracing::info!(
            payment_id = %intent.id,
            amount = quote.amount,
            currency = %quote.currency,
            items = %quote.skus.join(","),
            "Created PaymentIntent"
        );

        Ok(ChargeAuthorization {
            payment_id: intent.id.to_string(),
            client_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreshop_core::{AssetSource, CatalogItem, PDF_MIME};

    fn catalog() -> Catalog {
        let item = |sku: &str, title: &str, price: i64| CatalogItem {
            sku: sku.into(),
            title: title.into(),
            file_name: format!("{sku}.pdf"),
            mime_type: PDF_MIME.into(),
            source: AssetSource::parse(&format!("https://cdn.example.com/{sku}.pdf")),
            price,
        };
        Catalog {
            currency: "HKD".into(),
            default_sku: "sheet-music".into(),
            items: vec![
                item("sheet-music", "Sample Sheet Music", 24000),
                item("etude", "Etude", 500),
            ],
        }
    }

    fn request(email: Option<&str>) -> ChargeRequest {
        ChargeRequest {
            email: email.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_email_only_request_uses_default_item() {
        let quote = ChargeQuote::for_request(&catalog(), &request(Some("buyer@example.com"))).unwrap();
        assert_eq!(quote.amount, 24000);
        assert_eq!(quote.currency, "hkd");
        assert_eq!(quote.skus, vec!["sheet-music".to_string()]);
        assert_eq!(quote.metadata().get(METADATA_ITEMS).unwrap(), "sheet-music");
    }

    #[test]
    fn test_email_required() {
        for email in [None, Some(""), Some("nope")] {
            assert!(matches!(
                ChargeQuote::for_request(&catalog(), &request(email)),
                Err(PaymentError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_cart_priced_from_catalog() {
        let json = r#"{
            "email": "buyer@example.com",
            "amount": 1.00,
            "cartItems": [
                {"name": "Sample Sheet Music", "price": 0.50},
                {"sku": "etude", "price": 0.50},
                {"sku": "etude"}
            ],
            "name": "Clara",
            "country": "HK"
        }"#;
        let request: ChargeRequest = serde_json::from_str(json).unwrap();
        let quote = ChargeQuote::for_request(&catalog(), &request).unwrap();

        assert_eq!(quote.amount, 24000 + 500 + 500);
        assert_eq!(quote.skus, vec!["sheet-music".to_string(), "etude".to_string()]);

        let metadata = quote.metadata();
        assert_eq!(metadata.get(METADATA_ITEMS).unwrap(), "sheet-music,etude");
        assert_eq!(metadata.get(METADATA_CUSTOMER_NAME).unwrap(), "Clara");
        assert_eq!(metadata.get(METADATA_COUNTRY).unwrap(), "HK");
    }

    #[test]
    fn test_unknown_item_rejected() {
        let mut request = request(Some("buyer@example.com"));
        request.cart_items.push(CartItem {
            name: Some("Bootleg".into()),
            ..Default::default()
        });
        assert!(matches!(
            ChargeQuote::for_request(&catalog(), &request),
            Err(PaymentError::InvalidRequest(msg)) if msg.contains("Bootleg")
        ));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = StripeConfig::from_lookup(|key| match key {
            "STRIPE_SECRET_KEY" => Some("sk_test_xxx".into()),
            "STRIPE_WEBHOOK_SECRET" => Some("whsec_xxx".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.webhook_tolerance_secs, DEFAULT_TOLERANCE_SECS);
        assert!(!format!("{config:?}").contains("sk_test_xxx"));

        let missing = StripeConfig::from_lookup(|key| match key {
            "STRIPE_SECRET_KEY" => Some("sk_test_xxx".into()),
            _ => None,
        });
        assert!(matches!(missing, Err(PaymentError::Config(msg)) if msg.contains("STRIPE_WEBHOOK_SECRET")));
    }
}
