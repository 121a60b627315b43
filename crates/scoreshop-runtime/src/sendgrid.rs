//! SendGrid Mailer
//!
//! Sends receipts through the SendGrid v3 mail API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use scoreshop_core::{DeliveryError, DeliveryReceipt, Mailer, OutboundNotification, Result};
use serde::Serialize;

use crate::mailer::{DEFAULT_SEND_TIMEOUT, Sender};

/// Public API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

/// SendGrid API settings
#[derive(Clone)]
pub struct SendGridConfig {
    pub api_key: String,
    pub base_url: String,
    pub from: Sender,
    pub timeout: Duration,
}

impl fmt::Debug for SendGridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridConfig")
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SendGridConfig {
    /// Read `SENDGRID_API_KEY` and `SENDGRID_BASE_URL`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, from: Sender) -> Result<Self> {
        let api_key = lookup("SENDGRID_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DeliveryError::Config("SENDGRID_API_KEY not set".into()))?;

        Ok(Self {
            api_key,
            base_url: lookup("SENDGRID_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            from,
            timeout: DEFAULT_SEND_TIMEOUT,
        })
    }
}

#[derive(Serialize)]
struct MailSendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Contact<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
    custom_args: CustomArgs<'a>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Contact<'a>>,
}

#[derive(Serialize)]
struct Contact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct AttachmentPayload<'a> {
    content: String,
    #[serde(rename = "type")]
    content_type: &'a str,
    filename: &'a str,
    disposition: &'static str,
}

#[derive(Serialize)]
struct CustomArgs<'a> {
    payment_id: &'a str,
}

/// SendGrid implementation of [`Mailer`]
pub struct SendGridMailer {
    client: reqwest::Client,
    config: SendGridConfig,
}

impl SendGridMailer {
    pub fn new(config: SendGridConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn request<'a>(&'a self, notification: &'a OutboundNotification) -> MailSendRequest<'a> {
        let mut content = vec![Content {
            content_type: "text/plain",
            value: &notification.body_text,
        }];
        if let Some(html) = &notification.body_html {
            content.push(Content {
                content_type: "text/html",
                value: html,
            });
        }

        MailSendRequest {
            personalizations: vec![Personalization {
                to: vec![Contact {
                    email: notification.recipient.as_str(),
                    name: None,
                }],
            }],
            from: Contact {
                email: self.config.from.address.as_str(),
                name: Some(self.config.from.name.as_str()).filter(|n| !n.is_empty()),
            },
            subject: &notification.subject,
            content,
            attachments: notification
                .attachments
                .iter()
                .map(|asset| AttachmentPayload {
                    content: STANDARD.encode(&asset.bytes),
                    content_type: &asset.mime_type,
                    filename: &asset.file_name,
                    disposition: "attachment",
                })
                .collect(),
            custom_args: CustomArgs {
                payment_id: &notification.payment_id,
            },
        }
    }
}

/// Map a non-success API status onto a delivery error
fn classify(status: StatusCode, body: &str) -> DeliveryError {
    let detail = format!("SendGrid returned {status}: {}", body.chars().take(500).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        DeliveryError::TransientDelivery(detail)
    } else {
        DeliveryError::PermanentDelivery(detail)
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, notification: &OutboundNotification) -> Result<DeliveryReceipt> {
        let url = format!("{}/v3/mail/send", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request(notification))
            .send()
            .await
            .map_err(|e| DeliveryError::TransientDelivery(format!("SendGrid request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::debug!(payment_id = %notification.payment_id, ?message_id, "SendGrid accepted message");

        Ok(DeliveryReceipt::accepted(self.name(), message_id, notification))
    }

    fn name(&self) -> &str {
        "sendgrid"
    }
}
