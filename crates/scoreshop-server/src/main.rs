//! scoreshop HTTP Server
//!
//! Axum server for the sheet music shop: receives Stripe payment webhooks
//! and emails the purchased PDF, creates PaymentIntents for the storefront.

mod app;
mod config;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoreshop_core::{ComposerConfig, IdempotencyStore, MemoryIdempotencyStore, NotificationComposer};
use scoreshop_payments::{PaymentConfirmationHandler, StripeClient, StripeConfig};
use scoreshop_runtime::{CatalogResolver, MailerConfig, catalog_from_lookup};

use crate::app::{cors_layer, router};
use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = ServerConfig::from_env().context("server configuration")?;

    // Payments
    let stripe = StripeConfig::from_env().context("Stripe configuration")?;
    let verifier = stripe.webhook_verifier();
    let charges = Arc::new(StripeClient::new(&stripe));
    tracing::info!("✓ Stripe configured");

    // Catalog and assets
    let catalog = Arc::new(catalog_from_lookup(|key| std::env::var(key).ok()).context("catalog configuration")?);
    for item in &catalog.items {
        tracing::info!(sku = %item.sku, source = %item.source, price = item.price, "  Catalog item");
    }
    let resolver = Arc::new(
        CatalogResolver::new(catalog.clone(), server.timeouts.asset_fetch).context("asset resolver")?,
    );

    // Email
    let mailer = MailerConfig::from_env()
        .context("mail configuration")?
        .build()
        .context("mail provider")?;

    // Delivery ledger
    let ledger: Arc<dyn IdempotencyStore> = Arc::new(MemoryIdempotencyStore::new(server.ledger.clone()));

    let handler = PaymentConfirmationHandler::new(verifier, resolver, mailer, ledger.clone())
        .with_composer(NotificationComposer::new(ComposerConfig::from_lookup(|key| {
            std::env::var(key).ok()
        })))
        .with_timeouts(server.timeouts.clone());

    spawn_ledger_purge(ledger, server.purge_interval);

    // Build application state
    let state = AppState {
        handler: Arc::new(handler),
        charges,
        catalog,
    };

    let app = router(state, cors_layer(server.cors_allow_origin.as_deref())?);

    // Start server
    let listener = tokio::net::TcpListener::bind(&server.bind_addr)
        .await
        .with_context(|| format!("bind {}", server.bind_addr))?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 scoreshop server running on http://{}", server.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  POST /api/checkout    - Create PaymentIntent");
    tracing::info!("  POST /webhook/stripe  - Stripe webhook (delivery)");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Periodically drop expired ledger records
fn spawn_ledger_purge(ledger: Arc<dyn IdempotencyStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match ledger.purge_expired() {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired ledger records"),
                Err(e) => tracing::warn!(error = %e, "Ledger purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
