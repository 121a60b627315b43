//! Deliverable Assets
//!
//! The digital goods sent to buyers and the resolver capability that
//! locates them for an order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DeliveryError, Result};

/// MIME type of the sheet music PDFs
pub const PDF_MIME: &str = "application/pdf";

/// Where an asset's bytes come from
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetSource {
    /// `http://` or `https://` URL
    Url(String),

    /// Local file (plain path or `file://` URL)
    File(PathBuf),
}

impl AssetSource {
    /// Parse a locator string
    pub fn parse(locator: &str) -> Self {
        let locator = locator.trim();
        if locator.starts_with("http://") || locator.starts_with("https://") {
            AssetSource::Url(locator.to_string())
        } else if let Some(path) = locator.strip_prefix("file://") {
            AssetSource::File(PathBuf::from(path))
        } else {
            AssetSource::File(PathBuf::from(locator))
        }
    }

    pub fn locator(&self) -> String {
        match self {
            AssetSource::Url(url) => url.clone(),
            AssetSource::File(path) => format!("file://{}", path.display()),
        }
    }
}

impl From<String> for AssetSource {
    fn from(locator: String) -> Self {
        Self::parse(&locator)
    }
}

impl From<AssetSource> for String {
    fn from(source: AssetSource) -> Self {
        source.locator()
    }
}

impl std::fmt::Display for AssetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.locator())
    }
}

/// A resolved digital good, content included
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableAsset {
    /// Catalog SKU this asset was resolved for
    pub sku: String,

    /// Where the content was fetched from
    pub source: AssetSource,

    /// File content
    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// MIME type of the content
    pub mime_type: String,

    /// Attachment file name
    pub file_name: String,

    /// Human-readable item title
    pub title: String,
}

/// A purchased line of an order
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderLineItem {
    /// Catalog SKU
    pub sku: String,
}

impl OrderLineItem {
    pub fn new(sku: impl Into<String>) -> Self {
        Self { sku: sku.into() }
    }
}

/// Asset resolver (Strategy pattern)
///
/// Resolves an order's line items to the files that must be delivered.
/// Implementations fetch content fresh on every call.
#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// Resolve line items to assets, in order, one asset per distinct SKU
    async fn resolve(&self, items: &[OrderLineItem]) -> Result<Vec<DeliverableAsset>>;
}

/// Reject content that is empty or does not look like the declared type
///
/// `content_type` is the transport-reported type, when there is one.
pub fn validate_content(
    locator: &str,
    expected_mime: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<()> {
    if bytes.is_empty() {
        return Err(DeliveryError::AssetUnavailable(format!(
            "{locator}: empty payload"
        )));
    }

    if let Some(reported) = content_type {
        let essence = reported
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let acceptable = essence.is_empty()
            || essence == expected_mime
            || essence == "application/octet-stream"
            || essence == "binary/octet-stream";
        if !acceptable {
            return Err(DeliveryError::AssetUnavailable(format!(
                "{locator}: unexpected content type {essence}, wanted {expected_mime}"
            )));
        }
    }

    if expected_mime == PDF_MIME && !bytes.starts_with(b"%PDF-") {
        return Err(DeliveryError::AssetUnavailable(format!(
            "{locator}: content is not a PDF document"
        )));
    }

    Ok(())
}
