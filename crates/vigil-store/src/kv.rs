//! Key-value backend contract

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreResult;

/// Key namespaces: each record family is a distinct logical table in the
/// shared backend. No cross-namespace operation exists or is needed.
pub mod namespace {
    /// Revocation records, keyed by hashed JTI
    pub const REVOKED: &str = "vigil:revoked:";
    /// Idempotency records, keyed by operation fingerprint
    pub const IDEMPOTENCY: &str = "vigil:idem:";
    /// Webhook event records, keyed by external event ID
    pub const EVENT: &str = "vigil:event:";
    /// Static API key records, keyed by key hash
    pub const API_KEY: &str = "vigil:apikey:";
}

/// Shared state backend contract
///
/// All service instances treat the backend as the single source of truth.
/// Implementations must bound every operation with a timeout and report
/// timeouts as `StoreError::Unavailable` so callers never block indefinitely.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Set `key` to `value` with expiry only if the key does not exist.
    ///
    /// Returns `true` when the key was created. This is the atomic claim
    /// primitive behind pending idempotency records.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Get the value at `key`
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Check whether `key` exists
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete `key` (absent keys are not an error)
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List up to `limit` keys starting with `prefix`.
    ///
    /// Used by the administrative surface only; non-blocking cursor scan.
    async fn scan_prefix(&self, prefix: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Liveness probe
    async fn ping(&self) -> StoreResult<()>;
}
