//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use scoreshop_payments::{ChargeQuote, ChargeRequest, HandlerOutcome, PaymentError};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Header carrying the processor's signature over the raw body
pub const SIGNATURE_HEADER: &str = "stripe-signature";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub mail_provider: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        mail_provider: state.handler.mailer_name().to_string(),
    })
}

/// Create a PaymentIntent for the storefront's cart
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<ChargeRequest>,
) -> Result<Json<CheckoutResponse>, PaymentError> {
    let quote = ChargeQuote::for_request(&state.catalog, &request)?;
    let authorization = state.charges.create_charge(&quote).await?;

    Ok(Json(CheckoutResponse {
        client_secret: authorization.client_secret,
    }))
}

/// Stripe webhook
///
/// Takes the body as raw bytes: the signature covers the exact payload.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, PaymentError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaymentError::Authentication("missing Stripe signature header".into()))?;

    match state.handler.handle(&body, signature).await? {
        HandlerOutcome::Ignored { event_id, event_type } => {
            tracing::debug!(event_id = %event_id, event_type = %event_type, "Webhook acknowledged");
        }
        HandlerOutcome::Delivered { payment_id, .. } => {
            tracing::debug!(payment_id = %payment_id, "Webhook fulfilled");
        }
        HandlerOutcome::AlreadyDelivered { payment_id, .. } => {
            tracing::debug!(payment_id = %payment_id, "Webhook replay acknowledged");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}
