//! # scoreshop-payments
//!
//! Payment processing for the sheet music shop: Stripe charge creation and
//! the webhook that delivers purchased files once a payment succeeds.
//!
//! ## Flow
//!
//! ```text
//! ┌────────────┐ POST /api/checkout ┌──────────┐  PaymentIntent  ┌────────┐
//! │ Storefront │───────────────────▶│  Server  │────────────────▶│ Stripe │
//! │ (Elements) │◀── clientSecret ───│          │                 │        │
//! └────────────┘                    │          │◀─ webhook ──────│        │
//!                                   └────┬─────┘  (signed)       └────────┘
//!                                        │ verify → parse → claim
//!                                        ▼
//!                        resolve assets → compose → send email
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scoreshop_payments::{PaymentConfirmationHandler, StripeConfig};
//!
//! let stripe = StripeConfig::from_env()?;
//! let handler = PaymentConfirmationHandler::new(
//!     stripe.webhook_verifier(),
//!     resolver,
//!     mailer,
//!     ledger,
//! );
//!
//! // in the webhook route
//! let outcome = handler.handle(&body, signature_header).await?;
//! ```

mod checkout;
mod error;
mod handler;
#[cfg(feature = "axum-handlers")]
mod response;
mod signature;
mod webhook;

pub use checkout::{
    CartItem, ChargeAuthorization, ChargeInitiator, ChargeQuote, ChargeRequest, StripeClient,
    StripeConfig,
};
pub use error::{PaymentError, Result};
pub use handler::{DeliveryTimeouts, HandlerOutcome, PaymentConfirmationHandler};
#[cfg(feature = "axum-handlers")]
pub use response::ErrorResponse;
pub use signature::{DEFAULT_TOLERANCE_SECS, SignatureVerifier};
pub use webhook::{WebhookEvent, parse_event};
