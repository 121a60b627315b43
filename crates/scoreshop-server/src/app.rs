//! Router Assembly

use anyhow::Context;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{create_checkout, health_check, stripe_webhook};
use crate::state::AppState;

/// CORS for the storefront; any origin unless one is configured
pub fn cors_layer(allow_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match allow_origin {
        Some(origin) => cors.allow_origin(
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("CORS_ALLOW_ORIGIN invalid: {origin}"))?,
        ),
        None => cors.allow_origin(Any),
    })
}

/// Build the application router
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Storefront
        .route("/api/checkout", post(create_checkout))
        // Processor callbacks
        .route("/webhook/stripe", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
