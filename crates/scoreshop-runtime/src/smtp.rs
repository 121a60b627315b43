//! SMTP Mailer
//!
//! Sends receipts through an authenticated SMTP relay (Gmail by default)
//! using lettre's tokio transport.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use scoreshop_core::{DeliveryError, DeliveryReceipt, EmailAddress, Mailer, OutboundNotification, Result};
use serde::{Deserialize, Serialize};

use crate::mailer::{DEFAULT_SEND_TIMEOUT, Sender};

/// Connection security for the relay
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS, usually port 465
    #[default]
    Tls,
    /// STARTTLS upgrade, usually port 587
    StartTls,
    /// Plaintext, local relays and test servers only
    None,
}

impl SmtpSecurity {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            "none" | "plain" => Ok(Self::None),
            other => Err(DeliveryError::Config(format!("SMTP_SECURITY invalid: {other}"))),
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Self::Tls => 465,
            Self::StartTls => 587,
            Self::None => 25,
        }
    }
}

/// SMTP relay settings
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: SmtpSecurity,
    pub from: Sender,
    pub timeout: Duration,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("security", &self.security)
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SmtpConfig {
    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD` and
    /// `SMTP_SECURITY`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, from: Sender) -> Result<Self> {
        let security = match lookup("SMTP_SECURITY") {
            Some(raw) => SmtpSecurity::parse(&raw)?,
            None => SmtpSecurity::default(),
        };

        let port = match lookup("SMTP_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| DeliveryError::Config(format!("SMTP_PORT invalid: {raw}")))?,
            None => security.default_port(),
        };

        let username = lookup("SMTP_USERNAME").unwrap_or_default();
        let password = lookup("SMTP_PASSWORD").unwrap_or_default();
        if security != SmtpSecurity::None && (username.is_empty() || password.is_empty()) {
            return Err(DeliveryError::Config(
                "SMTP_USERNAME and SMTP_PASSWORD must be set".into(),
            ));
        }

        Ok(Self {
            host: lookup("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".into()),
            port,
            username,
            password,
            security,
            from,
            timeout: DEFAULT_SEND_TIMEOUT,
        })
    }
}

/// SMTP implementation of [`Mailer`]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let builder = match config.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| DeliveryError::Config(format!("SMTP relay {}: {e}", config.host)))?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                    DeliveryError::Config(format!("SMTP relay {}: {e}", config.host))
                })?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let mut builder = builder.port(config.port).timeout(Some(config.timeout));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username, config.password));
        }

        Ok(Self {
            transport: builder.build(),
            from: mailbox(&config.from.address, Some(config.from.name))?,
        })
    }
}

fn mailbox(address: &EmailAddress, name: Option<String>) -> Result<Mailbox> {
    let address: Address = address
        .as_str()
        .parse()
        .map_err(|e| DeliveryError::InvalidRecipient(format!("{address}: {e}")))?;
    Ok(Mailbox::new(name.filter(|n| !n.is_empty()), address))
}

/// Build the MIME message: text and HTML alternatives plus one part per
/// attachment
pub fn build_message(from: &Mailbox, notification: &OutboundNotification) -> Result<Message> {
    let body = match &notification.body_html {
        Some(html) => MultiPart::alternative_plain_html(notification.body_text.clone(), html.clone()),
        None => MultiPart::mixed().singlepart(SinglePart::plain(notification.body_text.clone())),
    };

    let mut content = MultiPart::mixed().multipart(body);
    for asset in &notification.attachments {
        let content_type = ContentType::parse(&asset.mime_type).map_err(|e| {
            DeliveryError::PermanentDelivery(format!("bad attachment type {}: {e}", asset.mime_type))
        })?;
        content = content.singlepart(
            Attachment::new(asset.file_name.clone()).body(asset.bytes.clone(), content_type),
        );
    }

    Message::builder()
        .from(from.clone())
        .to(mailbox(&notification.recipient, None)?)
        .subject(notification.subject.clone())
        .message_id(None)
        .multipart(content)
        .map_err(|e| DeliveryError::PermanentDelivery(format!("cannot build message: {e}")))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, notification: &OutboundNotification) -> Result<DeliveryReceipt> {
        let message = build_message(&self.from, notification)?;
        let message_id = message.headers().get_raw("Message-ID").map(str::to_string);

        self.transport.send(message).await.map_err(|e| {
            if e.is_permanent() {
                DeliveryError::PermanentDelivery(format!("SMTP rejected message: {e}"))
            } else {
                DeliveryError::TransientDelivery(format!("SMTP send failed: {e}"))
            }
        })?;

        tracing::debug!(payment_id = %notification.payment_id, "SMTP relay accepted message");

        Ok(DeliveryReceipt::accepted(self.name(), message_id, notification))
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreshop_core::{AssetSource, DeliverableAsset, PDF_MIME};

    fn sender() -> Sender {
        Sender::new(EmailAddress::parse("shop@gmail.com").unwrap(), "MyShop")
    }

    fn notification(html: bool) -> OutboundNotification {
        OutboundNotification {
            recipient: EmailAddress::parse("buyer@example.com").unwrap(),
            subject: "Receipt - Your Sheet Music Purchase".into(),
            body_text: "Thank you for your purchase of USD 10.00!".into(),
            body_html: html.then(|| "<h1>Thank you</h1>".to_string()),
            attachments: vec![DeliverableAsset {
                sku: "sheet-music".into(),
                source: AssetSource::parse("https://myshop.netlify.app/sheet_music.pdf"),
                bytes: b"%PDF-1.4 fake".to_vec(),
                mime_type: PDF_MIME.into(),
                file_name: "sheet_music.pdf".into(),
                title: "Sheet Music".into(),
            }],
            payment_id: "pi_1".into(),
        }
    }

    #[test]
    fn test_build_message_structure() {
        let from = mailbox(&sender().address, Some("MyShop".into())).unwrap();
        let message = build_message(&from, &notification(true)).unwrap();

        assert!(message.headers().get_raw("Message-ID").is_some());
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("buyer@example.com"));
        assert!(raw.contains("Receipt - Your Sheet Music Purchase"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("sheet_music.pdf"));
    }

    #[test]
    fn test_build_message_text_only() {
        let from = mailbox(&sender().address, None).unwrap();
        let raw = String::from_utf8(build_message(&from, &notification(false)).unwrap().formatted()).unwrap();

        assert!(!raw.contains("text/html"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn test_bad_attachment_type_is_permanent() {
        let from = mailbox(&sender().address, None).unwrap();
        let mut notification = notification(true);
        notification.attachments[0].mime_type = "not a mime type".into();

        assert!(matches!(
            build_message(&from, &notification),
            Err(DeliveryError::PermanentDelivery(_))
        ));
    }

    #[test]
    fn test_config_defaults_and_redaction() {
        let config = SmtpConfig::from_lookup(
            |key| match key {
                "SMTP_USERNAME" => Some("shop@gmail.com".into()),
                "SMTP_PASSWORD" => Some("hunter2".into()),
                _ => None,
            },
            sender(),
        )
        .unwrap();

        assert_eq!(config.port, 465);
        assert_eq!(config.security, SmtpSecurity::Tls);
        assert!(!format!("{config:?}").contains("hunter2"));

        let starttls = SmtpConfig::from_lookup(
            |key| match key {
                "SMTP_USERNAME" => Some("shop@gmail.com".into()),
                "SMTP_PASSWORD" => Some("pw".into()),
                "SMTP_SECURITY" => Some("starttls".into()),
                _ => None,
            },
            sender(),
        )
        .unwrap();
        assert_eq!(starttls.port, 587);
    }

    #[test]
    fn test_config_requires_credentials() {
        assert!(SmtpConfig::from_lookup(|_| None, sender()).is_err());

        let local = SmtpConfig::from_lookup(
            |key| match key {
                "SMTP_SECURITY" => Some("none".into()),
                "SMTP_HOST" => Some("localhost".into()),
                _ => None,
            },
            sender(),
        )
        .unwrap();
        assert_eq!(local.port, 25);
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = SmtpConfig::from_lookup(
            |key| match key {
                "SMTP_SECURITY" => Some("none".into()),
                "SMTP_HOST" => Some("127.0.0.1".into()),
                _ => None,
            },
            sender(),
        )
        .unwrap();
        config.port = port;
        config.timeout = Duration::from_secs(2);

        let mailer = SmtpMailer::new(config).unwrap();
        let err = mailer.send(&notification(true)).await.unwrap_err();
        assert!(matches!(err, DeliveryError::TransientDelivery(_)));
    }
}
