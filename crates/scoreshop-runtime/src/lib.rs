//! # scoreshop-runtime
//!
//! Concrete delivery integrations for scoreshop.
//!
//! ## Providers
//!
//! - **Catalog resolver**: fetches catalog files over HTTP(S) or from disk
//! - **SMTP** (default): authenticated relay via lettre, Gmail out of the box
//! - **SendGrid**: v3 mail API over HTTPS
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scoreshop_runtime::{CatalogResolver, MailerConfig, catalog_from_lookup};
//!
//! let catalog = Arc::new(catalog_from_lookup(|k| std::env::var(k).ok())?);
//! let resolver = CatalogResolver::new(catalog, DEFAULT_FETCH_TIMEOUT)?;
//! let mailer = MailerConfig::from_env()?.build()?;
//! ```

pub mod assets;
pub mod mailer;
pub mod sendgrid;
pub mod smtp;

pub use assets::{CatalogResolver, DEFAULT_FETCH_TIMEOUT, catalog_from_lookup};
pub use mailer::{DEFAULT_SEND_TIMEOUT, MailerConfig, Sender};
pub use sendgrid::{SendGridConfig, SendGridMailer};
pub use smtp::{SmtpConfig, SmtpMailer, SmtpSecurity, build_message};

// Re-export core types for convenience
pub use scoreshop_core::{AssetResolver, Catalog, DeliveryError, Mailer, Result};
