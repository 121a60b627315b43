//! Application State

use std::sync::Arc;

use scoreshop_core::Catalog;
use scoreshop_payments::{ChargeInitiator, PaymentConfirmationHandler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Webhook orchestrator (verify, resolve, compose, send)
    pub handler: Arc<PaymentConfirmationHandler>,

    /// Creates PaymentIntents for the storefront
    pub charges: Arc<dyn ChargeInitiator>,

    /// Priced catalog used by checkout
    pub catalog: Arc<Catalog>,
}
