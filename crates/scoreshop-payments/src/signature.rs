//! Webhook Signature Verification
//!
//! Stripe signs each webhook with `Stripe-Signature: t=<unix>,v1=<hex>`,
//! where `v1` is HMAC-SHA256 over `"{t}.{raw body}"` keyed by the endpoint
//! secret. Several `v1` entries may be present while a secret is rolled.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default replay window in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies webhook bodies against their signature header
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

struct ParsedHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the accepted clock skew / replay window
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify `payload` against `header` using the current time
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verify `payload` against `header` as of `now` (unix seconds)
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        if self.secret.trim().is_empty() {
            return Err(PaymentError::Authentication(
                "webhook secret not configured".into(),
            ));
        }

        let parsed = Self::parse_header(header)?;
        let mac = self.mac_for(parsed.timestamp, payload)?;

        let matched = parsed
            .signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
        if !matched {
            return Err(PaymentError::Authentication(
                "no signature matches the payload".into(),
            ));
        }

        if now.abs_diff(parsed.timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(PaymentError::Authentication(format!(
                "timestamp {} outside tolerance of {}s",
                parsed.timestamp, self.tolerance_secs
            )));
        }

        Ok(())
    }

    /// Build a valid signature header for `payload` at `timestamp`
    ///
    /// Used by tests and local tooling to produce events the endpoint accepts.
    pub fn sign_header(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let mac = self.mac_for(timestamp, payload)?;
        Ok(format!(
            "t={timestamp},v1={}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PaymentError::Config(format!("invalid webhook secret: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    fn parse_header(header: &str) -> Result<ParsedHeader> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        PaymentError::Authentication("unparseable signature timestamp".into())
                    })?);
                }
                // malformed hex can never match; skip it instead of failing the header
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            PaymentError::Authentication("signature header has no timestamp".into())
        })?;
        if signatures.is_empty() {
            return Err(PaymentError::Authentication(
                "signature header has no v1 signature".into(),
            ));
        }

        Ok(ParsedHeader {
            timestamp,
            signatures,
        })
    }
}
