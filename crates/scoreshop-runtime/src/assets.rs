//! Catalog Asset Resolver
//!
//! Resolves order lines through the catalog and fetches each file, over
//! HTTP or from the local filesystem. Nothing is cached: every delivery
//! attempt reads the current content.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scoreshop_core::{
    AssetResolver, AssetSource, Catalog, CatalogItem, DeliverableAsset, DeliveryError,
    OrderLineItem, PDF_MIME, Result, asset::validate_content,
};

/// Default per-request fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the deployment catalog from configuration
///
/// `CATALOG_PATH` names a JSON catalog; otherwise a single-item catalog is
/// built from `ASSET_URL` (required), `ASSET_FILE_NAME`, `ASSET_TITLE`,
/// `ASSET_SKU`, `PRICE_AMOUNT` and `PRICE_CURRENCY`.
pub fn catalog_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Catalog> {
    if let Some(path) = lookup("CATALOG_PATH").filter(|p| !p.trim().is_empty()) {
        let json = std::fs::read_to_string(path.trim())
            .map_err(|e| DeliveryError::Config(format!("cannot read catalog {path}: {e}")))?;
        return Catalog::from_json(&json);
    }

    let locator = lookup("ASSET_URL")
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| DeliveryError::Config("ASSET_URL not set".into()))?;

    let price = match lookup("PRICE_AMOUNT") {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| DeliveryError::Config(format!("PRICE_AMOUNT invalid: {raw}")))?,
        None => 24000,
    };

    let item = CatalogItem {
        sku: lookup("ASSET_SKU").unwrap_or_else(|| "sheet-music".into()),
        title: lookup("ASSET_TITLE").unwrap_or_else(|| "Sheet Music".into()),
        file_name: lookup("ASSET_FILE_NAME").unwrap_or_else(|| "sheet_music.pdf".into()),
        mime_type: lookup("ASSET_MIME_TYPE").unwrap_or_else(|| PDF_MIME.into()),
        source: AssetSource::parse(&locator),
        price,
    };

    let catalog = Catalog::single(item, lookup("PRICE_CURRENCY").unwrap_or_else(|| "hkd".into()));
    catalog.validate()?;
    Ok(catalog)
}

/// Resolver backed by the catalog
pub struct CatalogResolver {
    catalog: Arc<Catalog>,
    http: reqwest::Client,
}

impl CatalogResolver {
    pub fn new(catalog: Arc<Catalog>, fetch_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| DeliveryError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { catalog, http })
    }

    async fn fetch(&self, item: &CatalogItem) -> Result<DeliverableAsset> {
        let locator = item.source.locator();

        let bytes = match &item.source {
            AssetSource::Url(url) => {
                let (bytes, content_type) = self.fetch_url(url).await?;
                validate_content(&locator, &item.mime_type, content_type.as_deref(), &bytes)?;
                bytes
            }
            AssetSource::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    DeliveryError::AssetUnavailable(format!("{locator}: {e}"))
                })?;
                validate_content(&locator, &item.mime_type, None, &bytes)?;
                bytes
            }
        };

        tracing::debug!(sku = %item.sku, source = %locator, size = bytes.len(), "Fetched asset");

        Ok(DeliverableAsset {
            sku: item.sku.clone(),
            source: item.source.clone(),
            bytes,
            mime_type: item.mime_type.clone(),
            file_name: item.file_name.clone(),
            title: item.title.clone(),
        })
    }

    async fn fetch_url(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self.http.get(url).send().await.map_err(|e| {
            let why = if e.is_timeout() { "timed out".to_string() } else { e.to_string() };
            DeliveryError::AssetUnavailable(format!("{url}: {why}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::AssetUnavailable(format!("{url}: HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeliveryError::AssetUnavailable(format!("{url}: {e}")))?;

        Ok((bytes.to_vec(), content_type))
    }
}

#[async_trait]
impl AssetResolver for CatalogResolver {
    async fn resolve(&self, items: &[OrderLineItem]) -> Result<Vec<DeliverableAsset>> {
        let skus: Vec<String> = items.iter().map(|item| item.sku.clone()).collect();

        let mut assets = Vec::new();
        let mut resolved = HashSet::new();
        for line in self.catalog.line_items(&skus) {
            let item = self.catalog.find(&line.sku).ok_or_else(|| {
                DeliveryError::AssetUnavailable(format!("unknown item {}", line.sku))
            })?;
            // a SKU and its title name the same file
            if !resolved.insert(item.sku.as_str()) {
                continue;
            }
            assets.push(self.fetch(item).await?);
        }

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::header, routing::get};
    use std::collections::HashMap;

    const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n%%EOF";

    async fn asset_server() -> String {
        let app = Router::new()
            .route(
                "/sheet_music.pdf",
                get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], PDF) }),
            )
            .route(
                "/etude.pdf",
                get(|| async { ([(header::CONTENT_TYPE, "application/octet-stream")], PDF) }),
            )
            .route(
                "/empty.pdf",
                get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], "") }),
            )
            .route(
                "/spa-fallback.pdf",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html>Page not found</html>") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn item(sku: &str, locator: &str) -> CatalogItem {
        CatalogItem {
            sku: sku.into(),
            title: sku.to_uppercase(),
            file_name: format!("{sku}.pdf"),
            mime_type: PDF_MIME.into(),
            source: AssetSource::parse(locator),
            price: 500,
        }
    }

    fn resolver(items: Vec<CatalogItem>) -> CatalogResolver {
        let catalog = Catalog {
            currency: "usd".into(),
            default_sku: items[0].sku.clone(),
            items,
        };
        CatalogResolver::new(Arc::new(catalog), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_default_item_over_http() {
        let base = asset_server().await;
        let resolver = resolver(vec![item("sheet-music", &format!("{base}/sheet_music.pdf"))]);

        let assets = resolver.resolve(&[]).await.unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].sku, "sheet-music");
        assert_eq!(assets[0].bytes, PDF);
        assert_eq!(assets[0].file_name, "sheet-music.pdf");
    }

    #[tokio::test]
    async fn test_multi_item_order() {
        let base = asset_server().await;
        let resolver = resolver(vec![
            item("sheet-music", &format!("{base}/sheet_music.pdf")),
            item("etude", &format!("{base}/etude.pdf")),
        ]);

        let assets = resolver
            .resolve(&[
                OrderLineItem::new("etude"),
                OrderLineItem::new("sheet-music"),
                OrderLineItem::new("etude"),
            ])
            .await
            .unwrap();

        let skus: Vec<_> = assets.iter().map(|a| a.sku.as_str()).collect();
        assert_eq!(skus, vec!["etude", "sheet-music"]);
    }

    #[tokio::test]
    async fn test_sku_and_title_for_same_item_attach_once() {
        let base = asset_server().await;
        let resolver = resolver(vec![item("sheet-music", &format!("{base}/sheet_music.pdf"))]);

        let assets = resolver
            .resolve(&[OrderLineItem::new("sheet-music"), OrderLineItem::new("Sheet-Music")])
            .await
            .unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].sku, "sheet-music");
    }

    #[tokio::test]
    async fn test_not_found_is_unavailable() {
        let base = asset_server().await;
        let resolver = resolver(vec![item("gone", &format!("{base}/missing.pdf"))]);

        let err = resolver.resolve(&[]).await.unwrap_err();
        assert!(matches!(err, DeliveryError::AssetUnavailable(ref msg) if msg.contains("404")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_and_html_bodies_rejected() {
        let base = asset_server().await;

        let empty = resolver(vec![item("empty", &format!("{base}/empty.pdf"))]);
        assert!(matches!(empty.resolve(&[]).await, Err(DeliveryError::AssetUnavailable(_))));

        let html = resolver(vec![item("html", &format!("{base}/spa-fallback.pdf"))]);
        assert!(matches!(html.resolve(&[]).await, Err(DeliveryError::AssetUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unknown_sku() {
        let base = asset_server().await;
        let resolver = resolver(vec![item("sheet-music", &format!("{base}/sheet_music.pdf"))]);

        let err = resolver.resolve(&[OrderLineItem::new("bootleg")]).await.unwrap_err();
        assert!(matches!(err, DeliveryError::AssetUnavailable(ref msg) if msg.contains("bootleg")));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let resolver = resolver(vec![item("x", &format!("http://{addr}/x.pdf"))]);
        assert!(matches!(resolver.resolve(&[]).await, Err(DeliveryError::AssetUnavailable(_))));
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = std::env::temp_dir().join(format!("scoreshop-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.pdf");
        let bad = dir.join("bad.pdf");
        std::fs::write(&good, PDF).unwrap();
        std::fs::write(&bad, b"not a pdf").unwrap();

        let ok = resolver(vec![item("good", &format!("file://{}", good.display()))]);
        assert_eq!(ok.resolve(&[]).await.unwrap()[0].bytes, PDF);

        let corrupt = resolver(vec![item("bad", bad.to_str().unwrap())]);
        assert!(corrupt.resolve(&[]).await.is_err());

        let missing = resolver(vec![item("missing", &dir.join("nope.pdf").display().to_string())]);
        assert!(missing.resolve(&[]).await.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_catalog_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ASSET_URL", "https://myshop.netlify.app/sheet_music.pdf"),
            ("PRICE_AMOUNT", "1000"),
            ("PRICE_CURRENCY", "usd"),
        ]);
        let catalog = catalog_from_lookup(|key| env.get(key).map(|v| (*v).to_string())).unwrap();

        let item = catalog.default_item().unwrap();
        assert_eq!(item.price, 1000);
        assert_eq!(item.file_name, "sheet_music.pdf");
        assert_eq!(catalog.currency, "usd");
        assert!(matches!(item.source, AssetSource::Url(_)));
    }

    #[test]
    fn test_catalog_requires_asset_url() {
        assert!(matches!(
            catalog_from_lookup(|_| None),
            Err(DeliveryError::Config(msg)) if msg.contains("ASSET_URL")
        ));
        assert!(catalog_from_lookup(|key| match key {
            "ASSET_URL" => Some("https://x.example/a.pdf".into()),
            "PRICE_AMOUNT" => Some("ten dollars".into()),
            _ => None,
        })
        .is_err());
    }
}
