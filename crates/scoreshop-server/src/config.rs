//! Server Configuration

use std::time::Duration;

use anyhow::{Context, bail};
use scoreshop_core::LedgerConfig;
use scoreshop_payments::DeliveryTimeouts;

/// HTTP server and delivery tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub timeouts: DeliveryTimeouts,
    pub ledger: LedgerConfig,
    /// `None` allows any origin
    pub cors_allow_origin: Option<String>,
    pub purge_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            timeouts: DeliveryTimeouts::default(),
            ledger: LedgerConfig::default(),
            cors_allow_origin: None,
            purge_interval: Duration::from_secs(600),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let number = |key: &str| -> anyhow::Result<Option<u64>> {
            lookup(key)
                .map(|raw| raw.trim().parse::<u64>().with_context(|| format!("{key} invalid: {raw}")))
                .transpose()
        };

        let defaults = Self::default();

        let ttl_hours = number("LEDGER_TTL_HOURS")?;
        let lease_secs = number("LEDGER_LEASE_SECS")?;
        if ttl_hours == Some(0) {
            bail!("LEDGER_TTL_HOURS must be positive");
        }

        let ledger = LedgerConfig {
            completed_ttl: match ttl_hours {
                Some(hours) => i64::try_from(hours)
                    .ok()
                    .and_then(chrono::Duration::try_hours)
                    .context("LEDGER_TTL_HOURS out of range")?,
                None => defaults.ledger.completed_ttl,
            },
            claim_lease: match lease_secs {
                Some(secs) => i64::try_from(secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .context("LEDGER_LEASE_SECS out of range")?,
                None => defaults.ledger.claim_lease,
            },
        };

        let timeouts = DeliveryTimeouts {
            asset_fetch: number("ASSET_FETCH_TIMEOUT_SECS")?
                .map_or(defaults.timeouts.asset_fetch, Duration::from_secs),
            send: number("MAIL_SEND_TIMEOUT_SECS")?.map_or(defaults.timeouts.send, Duration::from_secs),
        };

        // a lease that can run out mid-delivery lets a redelivery send a second email
        let budget = timeouts.asset_fetch.saturating_add(timeouts.send);
        if !ledger.claim_lease.to_std().is_ok_and(|lease| lease > budget) {
            bail!(
                "LEDGER_LEASE_SECS ({}s) must exceed ASSET_FETCH_TIMEOUT_SECS + MAIL_SEND_TIMEOUT_SECS ({}s)",
                ledger.claim_lease.num_seconds(),
                budget.as_secs()
            );
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            timeouts,
            ledger,
            cors_allow_origin: lookup("CORS_ALLOW_ORIGIN")
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty() && origin != "*"),
            purge_interval: number("LEDGER_PURGE_INTERVAL_SECS")?
                .filter(|secs| *secs > 0)
                .map_or(defaults.purge_interval, Duration::from_secs),
        })
    }
}
