//! Idempotency Ledger
//!
//! Records which payments have already been delivered so that processor
//! re-deliveries (at-least-once webhooks, concurrent endpoint instances)
//! never send a second email.
//!
//! ```text
//!              try_claim
//!   (absent) ────────────▶ InFlight ──complete──▶ Completed(receipt)
//!      ▲                      │                       │
//!      └──release / lease─────┘                       │
//!      └───────────────────────── ttl ────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{DeliveryError, Result};
use crate::gateway::DeliveryReceipt;

/// Proof of ownership of an in-flight claim
///
/// A claim whose lease expired can be taken over by another attempt; the
/// old holder's token then no longer matches and its `complete`/`release`
/// calls leave the new holder's claim alone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Outcome of an atomic check-and-set on a key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Claim {
    /// Caller now owns the key and must `complete` or `release` it
    Acquired(ClaimToken),

    /// Another attempt holds the key
    InProgress,

    /// Already delivered; nothing to do
    Completed(DeliveryReceipt),
}

/// Ledger storage trait
///
/// `try_claim` must be atomic across every handler sharing the store.
pub trait IdempotencyStore: Send + Sync {
    /// Check-and-set: claim `key` unless it is in flight or completed
    fn try_claim(&self, key: &str) -> Result<Claim>;

    /// Mark a claimed key delivered
    ///
    /// Fails with [`DeliveryError::Storage`] when another attempt holds the
    /// key under a different token.
    fn complete(&self, key: &str, token: &ClaimToken, receipt: &DeliveryReceipt) -> Result<()>;

    /// Give up a claim after a failed attempt so a retry can take it
    ///
    /// No-op unless `token` still owns the key.
    fn release(&self, key: &str, token: &ClaimToken) -> Result<()>;

    /// Drop expired records, returning how many were removed
    fn purge_expired(&self) -> Result<usize>;
}

/// Ledger timings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How long a completed record suppresses re-delivery
    pub completed_ttl: Duration,

    /// How long an in-flight claim blocks other attempts
    pub claim_lease: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            completed_ttl: Duration::hours(72),
            claim_lease: Duration::minutes(5),
        }
    }
}

#[derive(Clone, Debug)]
enum Entry {
    InFlight { token: ClaimToken, expires_at: DateTime<Utc> },
    Completed { receipt: DeliveryReceipt, expires_at: DateTime<Utc> },
}

impl Entry {
    fn expires_at(&self) -> DateTime<Utc> {
        match self {
            Entry::InFlight { expires_at, .. } | Entry::Completed { expires_at, .. } => *expires_at,
        }
    }
}

/// In-memory ledger with TTL (single-process deployments)
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Entry>>,
    config: LedgerConfig,
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl MemoryIdempotencyStore {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| DeliveryError::Storage("ledger lock poisoned".into()))
    }
}

impl IdempotencyStore for MemoryIdempotencyStore {
    fn try_claim(&self, key: &str) -> Result<Claim> {
        let now = Utc::now();
        let mut entries = self.lock()?;

        match entries.get(key) {
            Some(entry) if entry.expires_at() > now => match entry {
                Entry::InFlight { .. } => return Ok(Claim::InProgress),
                Entry::Completed { receipt, .. } => return Ok(Claim::Completed(receipt.clone())),
            },
            Some(Entry::InFlight { .. }) => {
                tracing::warn!(key, "Reclaiming delivery claim whose lease expired");
            }
            _ => {}
        }

        let token = ClaimToken::new();
        entries.insert(
            key.to_string(),
            Entry::InFlight {
                token: token.clone(),
                expires_at: now + self.config.claim_lease,
            },
        );
        Ok(Claim::Acquired(token))
    }

    fn complete(&self, key: &str, token: &ClaimToken, receipt: &DeliveryReceipt) -> Result<()> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(Entry::InFlight { token: holder, .. }) if holder != token => {
                return Err(DeliveryError::Storage(format!(
                    "claim on {key} was taken over by another attempt"
                )));
            }
            Some(Entry::Completed { .. }) => {
                return Err(DeliveryError::Storage(format!("{key} already completed")));
            }
            // ours, or purged after the lease ran out with nobody else holding it
            _ => {}
        }
        entries.insert(
            key.to_string(),
            Entry::Completed {
                receipt: receipt.clone(),
                expires_at: Utc::now() + self.config.completed_ttl,
            },
        );
        Ok(())
    }

    fn release(&self, key: &str, token: &ClaimToken) -> Result<()> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(Entry::InFlight { token: holder, .. }) if holder == token => {
                entries.remove(key);
            }
            Some(Entry::InFlight { .. }) => {
                tracing::warn!(key, "Not releasing claim now held by another attempt");
            }
            _ => {}
        }
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at() > now);
        Ok(before - entries.len())
    }
}
