//! Mail Provider Selection
//!
//! Picks the concrete [`Mailer`] for a deployment from configuration.

use std::sync::Arc;
use std::time::Duration;

use scoreshop_core::{DeliveryError, EmailAddress, Mailer, Result};
use serde::{Deserialize, Serialize};

use crate::sendgrid::{SendGridConfig, SendGridMailer};
use crate::smtp::{SmtpConfig, SmtpMailer};

/// Default time allowed for one provider call
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// The `From:` identity of outgoing receipts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub address: EmailAddress,
    pub name: String,
}

impl Sender {
    pub fn new(address: EmailAddress, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }
}

/// Configured email provider
#[derive(Clone, Debug)]
pub enum MailerConfig {
    Smtp(SmtpConfig),
    SendGrid(SendGridConfig),
}

impl MailerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from `lookup`
    ///
    /// `MAIL_PROVIDER` is `smtp` (default) or `sendgrid`. `MAIL_FROM` falls
    /// back to `SMTP_USERNAME` for SMTP, the usual Gmail setup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = lookup("MAIL_PROVIDER")
            .map(|p| p.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "smtp".into());

        let timeout = match lookup("MAIL_SEND_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                DeliveryError::Config(format!("MAIL_SEND_TIMEOUT_SECS invalid: {raw}"))
            })?),
            None => DEFAULT_SEND_TIMEOUT,
        };

        let from_name = lookup("MAIL_FROM_NAME").unwrap_or_else(|| "MyShop".into());
        let sender = |fallback: Option<String>| -> Result<Sender> {
            let address = lookup("MAIL_FROM")
                .or(fallback)
                .ok_or_else(|| DeliveryError::Config("MAIL_FROM not set".into()))?;
            let address = EmailAddress::parse(&address)
                .map_err(|e| DeliveryError::Config(format!("MAIL_FROM invalid: {e}")))?;
            Ok(Sender::new(address, from_name.clone()))
        };

        match provider.as_str() {
            "smtp" => {
                let mut config = SmtpConfig::from_lookup(&lookup, sender(lookup("SMTP_USERNAME"))?)?;
                config.timeout = timeout;
                Ok(Self::Smtp(config))
            }
            "sendgrid" => {
                let mut config = SendGridConfig::from_lookup(&lookup, sender(None)?)?;
                config.timeout = timeout;
                Ok(Self::SendGrid(config))
            }
            other => Err(DeliveryError::Config(format!(
                "unknown MAIL_PROVIDER {other}, expected smtp or sendgrid"
            ))),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Smtp(_) => "smtp",
            Self::SendGrid(_) => "sendgrid",
        }
    }

    /// Build the mailer
    pub fn build(self) -> Result<Arc<dyn Mailer>> {
        let mailer: Arc<dyn Mailer> = match self {
            Self::Smtp(config) => Arc::new(SmtpMailer::new(config)?),
            Self::SendGrid(config) => Arc::new(SendGridMailer::new(config)?),
        };
        tracing::info!(provider = mailer.name(), "Mail provider configured");
        Ok(mailer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| env.get(key).cloned()
    }

    #[test]
    fn test_smtp_default_uses_username_as_sender() {
        let config = MailerConfig::from_lookup(lookup(&[
            ("SMTP_USERNAME", "shop@gmail.com"),
            ("SMTP_PASSWORD", "app-password"),
        ]))
        .unwrap();

        let MailerConfig::Smtp(smtp) = config else {
            panic!("expected smtp");
        };
        assert_eq!(smtp.host, "smtp.gmail.com");
        assert_eq!(smtp.from.address.as_str(), "shop@gmail.com");
        assert_eq!(smtp.from.name, "MyShop");
        assert_eq!(smtp.timeout, DEFAULT_SEND_TIMEOUT);
    }

    #[test]
    fn test_sendgrid_requires_sender() {
        assert!(MailerConfig::from_lookup(lookup(&[
            ("MAIL_PROVIDER", "sendgrid"),
            ("SENDGRID_API_KEY", "SG.key"),
        ]))
        .is_err());

        let config = MailerConfig::from_lookup(lookup(&[
            ("MAIL_PROVIDER", "SendGrid"),
            ("SENDGRID_API_KEY", "SG.key"),
            ("MAIL_FROM", "receipts@myshop.com"),
            ("MAIL_SEND_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.provider_name(), "sendgrid");
        let MailerConfig::SendGrid(sendgrid) = config else {
            panic!("expected sendgrid");
        };
        assert_eq!(sendgrid.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_unknown_provider_and_bad_values() {
        assert!(MailerConfig::from_lookup(lookup(&[("MAIL_PROVIDER", "pigeon")])).is_err());
        assert!(MailerConfig::from_lookup(lookup(&[
            ("SMTP_USERNAME", "shop@gmail.com"),
            ("SMTP_PASSWORD", "pw"),
            ("MAIL_SEND_TIMEOUT_SECS", "soon"),
        ]))
        .is_err());
        assert!(MailerConfig::from_lookup(lookup(&[
            ("SMTP_USERNAME", "not-an-address"),
            ("SMTP_PASSWORD", "pw"),
        ]))
        .is_err());
    }

    #[tokio::test]
    async fn test_build_mailers() {
        let smtp = MailerConfig::from_lookup(lookup(&[
            ("SMTP_USERNAME", "shop@gmail.com"),
            ("SMTP_PASSWORD", "pw"),
        ]))
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(smtp.name(), "smtp");

        let sendgrid = MailerConfig::from_lookup(lookup(&[
            ("MAIL_PROVIDER", "sendgrid"),
            ("SENDGRID_API_KEY", "SG.key"),
            ("MAIL_FROM", "receipts@myshop.com"),
        ]))
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(sendgrid.name(), "sendgrid");
    }
}
