//! Notification Composer
//!
//! Builds the receipt email for a paid order. Pure: no I/O and no clock,
//! every timestamp is rendered from the event's `created_at`, so the same
//! event and assets always produce the same notification.

use chrono::{Datelike, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::asset::DeliverableAsset;
use crate::error::{DeliveryError, Result};
use crate::event::PaymentEvent;
use crate::notification::{EmailAddress, OutboundNotification};

/// Storefront branding rendered into receipts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposerConfig {
    pub shop_name: String,
    pub tagline: String,
    pub support_email: String,
    pub site_url: String,
    pub subject: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            shop_name: "MyShop".into(),
            tagline: "Your trusted source for sheet music".into(),
            support_email: "support@myshop.com".into(),
            site_url: "https://myshop.netlify.app".into(),
            subject: "Receipt - Your Sheet Music Purchase".into(),
        }
    }
}

impl ComposerConfig {
    /// Defaults overridden by `SHOP_*` values from `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            shop_name: lookup("SHOP_NAME").unwrap_or(defaults.shop_name),
            tagline: lookup("SHOP_TAGLINE").unwrap_or(defaults.tagline),
            support_email: lookup("SHOP_SUPPORT_EMAIL").unwrap_or(defaults.support_email),
            site_url: lookup("SHOP_SITE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.site_url),
            subject: lookup("RECEIPT_SUBJECT").unwrap_or(defaults.subject),
        }
    }
}

/// Receipt email builder
#[derive(Clone, Debug, Default)]
pub struct NotificationComposer {
    config: ComposerConfig,
}

impl NotificationComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    /// Compose the receipt for `event` carrying `assets` as attachments
    pub fn compose(
        &self,
        event: &PaymentEvent,
        assets: &[DeliverableAsset],
    ) -> Result<OutboundNotification> {
        let raw_recipient = event
            .receipt_email
            .as_deref()
            .ok_or_else(|| DeliveryError::InvalidRecipient("no receipt email".into()))?;
        let recipient = EmailAddress::parse(raw_recipient)?;

        Ok(OutboundNotification {
            body_text: self.render_text(event, assets),
            body_html: Some(self.render_html(event, &recipient, assets)),
            subject: single_line(&self.config.subject),
            recipient,
            attachments: assets.to_vec(),
            payment_id: event.payment_id.clone(),
        })
    }

    fn render_text(&self, event: &PaymentEvent, assets: &[DeliverableAsset]) -> String {
        let mut text = String::new();

        if let Some(name) = event.customer_name.as_deref().filter(|n| !n.trim().is_empty()) {
            let _ = write!(text, "Hi {},\n\n", single_line(name));
        }

        let _ = write!(
            text,
            "Thank you for your purchase of {}! Your sheet music is attached.\n\n",
            event.display_total()
        );

        if assets.len() > 1 {
            text.push_str("Items:\n");
            for asset in assets {
                let _ = writeln!(text, "- {} ({})", single_line(&asset.title), asset.file_name);
            }
            text.push('\n');
        }

        let _ = write!(
            text,
            "Transaction ID: {}\nDate: {}",
            event.payment_id,
            iso_timestamp(event)
        );

        text
    }

    fn render_html(
        &self,
        event: &PaymentEvent,
        recipient: &EmailAddress,
        assets: &[DeliverableAsset],
    ) -> String {
        let config = &self.config;
        let shop = escape_html(&config.shop_name);
        let site = escape_html(&config.site_url);
        let support = escape_html(&config.support_email);
        let total = escape_html(&event.display_total());

        let greeting = event
            .customer_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(|name| format!("<p style=\"color: #333; font-size: 16px;\">Hi {},</p>\n", escape_html(name)))
            .unwrap_or_default();

        let mut rows = String::new();
        for asset in assets {
            let _ = write!(
                rows,
                "{}",
                table_row("Item:", &format!("{} ({})", asset.title, asset.file_name))
            );
        }
        rows.push_str(&table_row("Transaction ID:", &event.payment_id));
        rows.push_str(&table_row("Date:", &iso_timestamp(event)));

        let unsubscribe = format!(
            "{}/unsubscribe?email={}",
            config.site_url,
            encode_query_component(recipient.as_str())
        );

        format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 8px;">
  <div style="text-align: center; padding-bottom: 20px; border-bottom: 1px solid #e0e0e0;">
    <h1 style="color: #333; margin: 0;">{shop}</h1>
    <p style="color: #666; font-size: 14px;">{tagline}</p>
  </div>
  <div style="padding: 20px 0;">
    {greeting}<h2 style="color: #333;">Thank You for Your Purchase!</h2>
    <p style="color: #666; font-size: 16px;">
      We&#39;ve received your payment of <strong>{total}</strong>. Your sheet music is attached below.
    </p>
    <table style="width: 100%; margin: 20px 0; border-collapse: collapse;">
{rows}    </table>
    <p style="color: #666; font-size: 14px;">
      If you have any questions, feel free to reply to this email or contact us at <a href="mailto:{support}" style="color: #007bff; text-decoration: none;">{support}</a>.
    </p>
  </div>
  <div style="text-align: center; padding-top: 20px; border-top: 1px solid #e0e0e0; color: #666; font-size: 12px;">
    <p>&copy; {year} {shop}. All rights reserved.</p>
    <p>
      <a href="{site}" style="color: #007bff; text-decoration: none;">Visit our website</a> |
      <a href="{unsubscribe}" style="color: #007bff; text-decoration: none;">Unsubscribe</a>
    </p>
  </div>
</div>
"#,
            tagline = escape_html(&config.tagline),
            year = event.created_at.year(),
            unsubscribe = escape_html(&unsubscribe),
        )
    }
}

fn table_row(label: &str, value: &str) -> String {
    format!(
        "      <tr>\n        <td style=\"padding: 8px; color: #666; font-size: 14px; border-bottom: 1px solid #e0e0e0;\"><strong>{}</strong></td>\n        <td style=\"padding: 8px; color: #333; font-size: 14px; border-bottom: 1px solid #e0e0e0;\">{}</td>\n      </tr>\n",
        escape_html(label),
        escape_html(value)
    )
}

fn iso_timestamp(event: &PaymentEvent) -> String {
    event.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Collapse line breaks so header-bound text stays on one line
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape text for embedding in HTML element content or attribute values
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_query_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetSource, PDF_MIME};
    use crate::event::EventKind;
    use chrono::{TimeZone, Utc};

    fn event() -> PaymentEvent {
        PaymentEvent {
            event_id: "evt_1".into(),
            kind: EventKind::PaymentSucceeded,
            payment_id: "pi_1".into(),
            amount: 1000,
            currency: "usd".into(),
            receipt_email: Some("buyer@example.com".into()),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            items: Vec::new(),
            customer_name: None,
            signature_header: String::new(),
        }
    }

    fn asset(title: &str) -> DeliverableAsset {
        DeliverableAsset {
            sku: "sheet-music".into(),
            source: AssetSource::parse("https://myshop.netlify.app/sheet_music.pdf"),
            bytes: b"%PDF-1.4 test".to_vec(),
            mime_type: PDF_MIME.into(),
            file_name: "sheet_music.pdf".into(),
            title: title.into(),
        }
    }

    #[test]
    fn test_compose_receipt() {
        let composer = NotificationComposer::default();
        let notification = composer.compose(&event(), &[asset("Sheet Music")]).unwrap();

        assert_eq!(notification.recipient.as_str(), "buyer@example.com");
        assert!(notification.subject.contains("Sheet Music"));
        assert!(notification.body_text.contains("USD 10.00"));
        assert!(notification.body_text.contains("Transaction ID: pi_1"));
        assert!(notification.body_text.contains("Date: 2023-11-14T22:13:20.000Z"));
        assert_eq!(notification.attachments.len(), 1);
        assert_eq!(notification.attachments[0].file_name, "sheet_music.pdf");

        let html = notification.body_html.unwrap();
        assert!(html.contains("<strong>USD 10.00</strong>"));
        assert!(html.contains("&copy; 2023 MyShop"));
        assert!(html.contains("unsubscribe?email=buyer%40example.com"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let composer = NotificationComposer::default();
        let assets = [asset("Sheet Music")];

        let first = composer.compose(&event(), &assets).unwrap();
        let second = composer.compose(&event(), &assets).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.body_html, second.body_html);
        assert_eq!(first.attachments[0].bytes, second.attachments[0].bytes);
    }

    #[test]
    fn test_user_content_is_escaped() {
        let composer = NotificationComposer::default();
        let mut event = event();
        event.customer_name = Some("<script>alert('x')</script>".into());

        let notification = composer
            .compose(&event, &[asset("Nocturne <b>Op. 9</b> & \"friends\"")])
            .unwrap();
        let html = notification.body_html.unwrap();

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(html.contains("Nocturne &lt;b&gt;Op. 9&lt;/b&gt; &amp; &quot;friends&quot;"));
    }

    #[test]
    fn test_multi_item_listing() {
        let composer = NotificationComposer::default();
        let notification = composer
            .compose(&event(), &[asset("Etude"), asset("Suite")])
            .unwrap();

        assert!(notification.body_text.contains("- Etude (sheet_music.pdf)"));
        assert!(notification.body_text.contains("- Suite (sheet_music.pdf)"));
        assert_eq!(notification.attachments.len(), 2);
    }

    #[test]
    fn test_missing_or_invalid_recipient() {
        let composer = NotificationComposer::default();

        let mut missing = event();
        missing.receipt_email = None;
        assert!(matches!(
            composer.compose(&missing, &[]),
            Err(DeliveryError::InvalidRecipient(_))
        ));

        let mut invalid = event();
        invalid.receipt_email = Some("not-an-address".into());
        assert!(composer.compose(&invalid, &[]).is_err());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ComposerConfig::from_lookup(|key| match key {
            "SHOP_NAME" => Some("Scores & Co".into()),
            "SHOP_SITE_URL" => Some("https://scores.example/".into()),
            _ => None,
        });

        assert_eq!(config.shop_name, "Scores & Co");
        assert_eq!(config.site_url, "https://scores.example");
        assert_eq!(config.support_email, "support@myshop.com");

        let html = NotificationComposer::new(config)
            .compose(&event(), &[asset("Sheet Music")])
            .unwrap()
            .body_html
            .unwrap();
        assert!(html.contains("Scores &amp; Co"));
    }
}
