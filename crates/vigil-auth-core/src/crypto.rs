//! Cryptographic utilities for secure operations
//!
//! This module provides the security-critical primitives that must be
//! implemented correctly to prevent timing attacks and other side-channel
//! vulnerabilities. All secret-derived comparisons in the workspace route
//! through [`constant_time_eq`] or [`TimingSafeComparator`]; no other code
//! may branch on secret material.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

/// Pre-computed HMAC key for efficient repeated signing operations.
///
/// Creating an HMAC instance from raw bytes has overhead. This struct
/// pre-validates the key and allows efficient cloning for signing.
#[derive(Clone)]
pub struct HmacKey {
    key_bytes: Arc<[u8]>,
}

impl HmacKey {
    /// Minimum allowed key length in bytes (256 bits)
    pub const MIN_KEY_LENGTH: usize = 32;

    /// Create a new HMAC key from bytes.
    ///
    /// # Errors
    /// Returns error if key is too short (less than 32 bytes).
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, HmacKeyError> {
        let key_bytes = key.as_ref();
        if key_bytes.len() < Self::MIN_KEY_LENGTH {
            return Err(HmacKeyError::KeyTooShort {
                actual: key_bytes.len(),
                minimum: Self::MIN_KEY_LENGTH,
            });
        }
        Ok(Self {
            key_bytes: Arc::from(key_bytes),
        })
    }

    /// Raw key bytes (for handing to a token signer)
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    /// Sign data and return the MAC bytes
    pub fn sign(&self, data: &[u8]) -> [u8; 32] {
        // Cannot fail because key length was validated in new()
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key_bytes)
            .expect("HMAC key length already validated");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// Verify a signature in constant time
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let expected = self.sign(data);
        constant_time_eq(&expected, signature)
    }
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacKey")
            .field("key_length", &self.key_bytes.len())
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when creating an HMAC key
#[derive(Debug, Clone, thiserror::Error)]
pub enum HmacKeyError {
    #[error("HMAC key too short: got {actual} bytes, need at least {minimum}")]
    KeyTooShort { actual: usize, minimum: usize },
}

/// Constant-time byte slice comparison.
///
/// Comparison time depends only on the length of the slices, not on their
/// contents or on where the first difference occurs.
///
/// # Security
/// - Returns `false` immediately if lengths differ (length is not secret)
/// - Compares all bytes even after finding a difference
/// - Uses XOR accumulator to prevent branch prediction attacks
#[inline]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let result = a
        .iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));

    result == 0
}

/// Securely hash a credential for storage or key derivation.
///
/// SHA-256, hex-encoded: one-way, fixed output length, so raw credential
/// material never appears in backend keys or logs.
pub fn hash_credential(value: &str) -> String {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Timing-safe comparator with response jitter.
///
/// Wraps [`constant_time_eq`] and adds a random delay drawn uniformly from a
/// fixed, documented window after every comparison, win or lose, so total
/// response latency cannot be correlated with validation outcome. The window
/// is configuration, not secret material.
#[derive(Debug, Clone)]
pub struct TimingSafeComparator {
    jitter_min: Duration,
    jitter_max: Duration,
}

impl TimingSafeComparator {
    /// Create a comparator with the given jitter window.
    ///
    /// The window is normalized so `min <= max`.
    pub fn new(jitter_min: Duration, jitter_max: Duration) -> Self {
        if jitter_min <= jitter_max {
            Self { jitter_min, jitter_max }
        } else {
            Self { jitter_min: jitter_max, jitter_max: jitter_min }
        }
    }

    /// The configured jitter window `(min, max)`
    pub fn jitter_window(&self) -> (Duration, Duration) {
        (self.jitter_min, self.jitter_max)
    }

    /// Compare two secret-derived byte sequences, then sleep for the jitter.
    pub async fn verify(&self, a: &[u8], b: &[u8]) -> bool {
        let equal = constant_time_eq(a, b);
        self.apply_jitter().await;
        equal
    }

    /// Sleep for a random duration inside the jitter window.
    ///
    /// Also applied on paths that short-circuit before comparison (rate
    /// limited, malformed input) so those responses blend in too.
    pub async fn apply_jitter(&self) {
        let jitter = self.random_jitter();
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter_min == self.jitter_max {
            return self.jitter_min;
        }
        let min = self.jitter_min.as_micros() as u64;
        let max = self.jitter_max.as_micros() as u64;
        let micros = rand::thread_rng().gen_range(min..=max);
        Duration::from_micros(micros)
    }
}
