//! Product Catalog
//!
//! Maps purchasable SKUs to their price and the file delivered for them.
//! A deployment is one catalog: the single-PDF shop is a catalog of one.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::asset::{AssetSource, OrderLineItem, PDF_MIME};
use crate::error::{DeliveryError, Result};

fn default_mime() -> String {
    PDF_MIME.into()
}

/// A purchasable item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Stable identifier written into payment metadata
    pub sku: String,

    /// Display title ("Sheet Music")
    pub title: String,

    /// Attachment file name
    pub file_name: String,

    /// MIME type of the delivered file
    #[serde(default = "default_mime")]
    pub mime_type: String,

    /// Asset locator (URL or path)
    pub source: AssetSource,

    /// Price in minor currency units
    pub price: i64,
}

/// The set of items a deployment sells
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// ISO currency code all prices are in
    pub currency: String,

    /// SKU delivered when an order carries no item list
    pub default_sku: String,

    pub items: Vec<CatalogItem>,
}

impl Catalog {
    /// Catalog with a single item, which is also the default
    pub fn single(item: CatalogItem, currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            default_sku: item.sku.clone(),
            items: vec![item],
        }
    }

    /// Parse a JSON catalog and check it is usable
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| DeliveryError::Config(format!("invalid catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check SKUs are unique, prices sane and the default exists
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(DeliveryError::Config("catalog has no items".into()));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if item.sku.trim().is_empty() {
                return Err(DeliveryError::Config("catalog item with empty sku".into()));
            }
            if !seen.insert(item.sku.as_str()) {
                return Err(DeliveryError::Config(format!("duplicate sku {}", item.sku)));
            }
            if item.price < 0 {
                return Err(DeliveryError::Config(format!("negative price for {}", item.sku)));
            }
        }

        if self.get(&self.default_sku).is_none() {
            return Err(DeliveryError::Config(format!(
                "default sku {} is not in the catalog",
                self.default_sku
            )));
        }

        Ok(())
    }

    /// Look up by SKU
    pub fn get(&self, sku: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.sku == sku)
    }

    /// Look up by SKU, falling back to a case-insensitive title match
    ///
    /// Storefront carts only know display names.
    pub fn find(&self, sku_or_title: &str) -> Option<&CatalogItem> {
        let needle = sku_or_title.trim();
        self.get(needle).or_else(|| {
            self.items
                .iter()
                .find(|item| item.title.eq_ignore_ascii_case(needle))
        })
    }

    pub fn default_item(&self) -> Option<&CatalogItem> {
        self.get(&self.default_sku)
    }

    /// Distinct line items for an order, defaulting when empty
    pub fn line_items(&self, skus: &[String]) -> Vec<OrderLineItem> {
        let mut seen = HashSet::new();
        let items: Vec<OrderLineItem> = skus
            .iter()
            .map(|sku| sku.trim())
            .filter(|sku| !sku.is_empty() && seen.insert(*sku))
            .map(OrderLineItem::new)
            .collect();

        if items.is_empty() {
            vec![OrderLineItem::new(self.default_sku.clone())]
        } else {
            items
        }
    }
}
