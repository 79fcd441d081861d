//! Billing webhook signature verification
//!
//! Header format: `stripe-signature: t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The signed payload is `"<t>.<raw body>"`, HMAC-SHA256 keyed by the
//! endpoint secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature header
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum clock skew between signing and receipt
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Signature verification failures (all map to 400)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Webhook secret not configured")]
    MissingSecret,

    #[error("Missing stripe-signature header")]
    MissingHeader,

    #[error("Malformed stripe-signature header")]
    MalformedHeader,

    #[error("Timestamp outside tolerance ({0}s skew)")]
    StaleTimestamp(i64),

    #[error("No matching v1 signature")]
    Mismatch,

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Verified billing event
#[derive(Debug, Clone, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: BillingEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingEventData {
    pub object: Value,
}

/// Checks signatures against the configured endpoint secret
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Verify `payload` against `header` and parse the event
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<BillingEvent, SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<BillingEvent, SignatureError> {
        let secret = self.secret.as_deref().ok_or(SignatureError::MissingSecret)?;
        let header = header.ok_or(SignatureError::MissingHeader)?;
        let (timestamp, signatures) = parse_header(header)?;

        let skew = (now - timestamp).abs();
        if skew > self.tolerance_secs {
            return Err(SignatureError::StaleTimestamp(skew));
        }

        let mac = signing_mac(secret, timestamp, payload)?;
        // verify_slice compares in constant time
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        serde_json::from_slice(payload).map_err(|e| SignatureError::InvalidPayload(e.to_string()))
    }
}

fn signing_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MissingSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or(SignatureError::MalformedHeader)?;
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    match (timestamp, signatures.is_empty()) {
        (Some(t), false) => Ok((t, signatures)),
        _ => Err(SignatureError::MalformedHeader),
    }
}

/// Build a valid header for `payload` (used by tests and local tooling)
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let signature = signing_mac(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}
