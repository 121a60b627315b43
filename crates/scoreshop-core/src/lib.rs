//! # scoreshop-core
//!
//! Order delivery domain for the sheet music shop: what gets delivered,
//! how the receipt email is built, and the capabilities the payment
//! confirmation handler drives.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 Payment Confirmation Handler                     │
//! │  ┌───────────────┐  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │ AssetResolver │─▶│ NotificationCom- │─▶│  Mailer          │  │
//! │  │  (Strategy)   │  │ poser (pure)     │  │  (Strategy)      │  │
//! │  └───────────────┘  └──────────────────┘  └──────────────────┘  │
//! │                    IdempotencyStore (check-and-set)              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `AssetResolver`, `Mailer` and `IdempotencyStore` are traits so the
//! fetch source, the email provider and the ledger backend can be swapped
//! per deployment without touching the orchestration.

pub mod asset;
pub mod catalog;
pub mod composer;
pub mod error;
pub mod event;
pub mod gateway;
pub mod ledger;
pub mod notification;

pub use asset::{AssetResolver, AssetSource, DeliverableAsset, OrderLineItem, PDF_MIME};
pub use catalog::{Catalog, CatalogItem};
pub use composer::{ComposerConfig, NotificationComposer};
pub use error::{DeliveryError, Result};
pub use event::{EventKind, PaymentEvent};
pub use gateway::{DeliveryReceipt, Mailer, MemoryMailer};
pub use ledger::{Claim, ClaimToken, IdempotencyStore, LedgerConfig, MemoryIdempotencyStore};
pub use notification::{EmailAddress, OutboundNotification};
