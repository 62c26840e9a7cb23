//! Provider webhook signature verification
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac-sha256>`, where the MAC
//! covers `<timestamp>.<raw body>`. Comparison runs through the timing-safe
//! comparator; timestamps outside the tolerance window are rejected to stop
//! replayed captures.

use chrono::Utc;

use vigil_auth_core::crypto::{HmacKey, TimingSafeComparator};

use crate::config::EventConfig;
use crate::error::EventError;

/// Verifies provider signatures against the shared signing secret
#[derive(Clone)]
pub struct SignatureVerifier {
    key: HmacKey,
    comparator: TimingSafeComparator,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    /// Create a verifier.
    ///
    /// Fails if the signing secret is shorter than the HMAC key minimum.
    pub fn new(config: &EventConfig, comparator: TimingSafeComparator) -> Result<Self, EventError> {
        let key = HmacKey::new(config.signing_secret.as_bytes())
            .map_err(|e| EventError::MalformedPayload(e.to_string()))?;
        Ok(Self {
            key,
            comparator,
            tolerance_secs: config.timestamp_tolerance.as_secs() as i64,
        })
    }

    /// Verify `signature_header` over `payload`.
    ///
    /// Every rejection path applies the comparator's jitter so response
    /// latency does not reveal which check failed.
    pub async fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), EventError> {
        // Parse signature header: t=timestamp,v1=signature
        let mut timestamp: Option<&str> = None;
        let mut sig_v1: Option<&str> = None;

        for part in signature_header.split(',') {
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => sig_v1 = Some(value),
                    _ => {}
                }
            }
        }

        let (Some(timestamp), Some(sig_v1)) = (timestamp, sig_v1) else {
            tracing::warn!("Webhook signature header missing timestamp or v1 component");
            self.comparator.apply_jitter().await;
            return Err(EventError::SignatureMismatch);
        };

        let Ok(ts) = timestamp.parse::<i64>() else {
            self.comparator.apply_jitter().await;
            return Err(EventError::SignatureMismatch);
        };

        let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + payload.len());
        signed_payload.extend_from_slice(timestamp.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        let expected = hex::encode(self.key.sign(&signed_payload));

        if !self
            .comparator
            .verify(sig_v1.as_bytes(), expected.as_bytes())
            .await
        {
            tracing::warn!("Webhook signature verification failed");
            return Err(EventError::SignatureMismatch);
        }

        // Freshness window bounds replay of captured deliveries
        let now = Utc::now().timestamp();
        if (now - ts).abs() > self.tolerance_secs {
            tracing::warn!(timestamp = ts, now, "Webhook timestamp outside tolerance");
            return Err(EventError::SignatureMismatch);
        }

        Ok(())
    }

    /// Produce a valid header for `payload` (used by tests and local tools)
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let mut signed_payload = Vec::new();
        signed_payload.extend_from_slice(timestamp.to_string().as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);
        let signature = hex::encode(self.key.sign(&signed_payload));
        format!("t={timestamp},v1={signature}")
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}
