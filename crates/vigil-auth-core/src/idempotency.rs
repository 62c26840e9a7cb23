//! Deterministic operation deduplication
//!
//! Idempotency keys are canonical fingerprints of an operation's
//! semantically-relevant inputs, never random values: identical logical
//! requests always map to the same key. Each key owns at most one in-flight
//! or completed record in the shared backend; the `pending` record doubles
//! as an advisory distributed lock scoped to that key.
//!
//! The backend is the only safe place for these records. There is no local
//! fallback here: deduplicating against an instance-local store would
//! silently re-execute side effects on other instances, so backend outages
//! surface as `StoreUnavailable` instead.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use vigil_store::{KeyValueStore, StoreError, namespace};
use vigil_types::Jti;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Boxed error type accepted from idempotent operations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fixed namespace for name-based identifier derivation.
///
/// Changing this value changes every derived identifier; it is part of the
/// persisted data format.
pub const DERIVATION_NAMESPACE: Uuid = Uuid::from_u128(0x8f3c_1f6a_52d4_41e9_9b1d_7a45_c803_2ce1);

/// Canonical fingerprint of operation inputs: SHA-256 over the
/// length-prefixed parts, hex-encoded.
///
/// Length prefixes keep the encoding injective, so `["ab", "c"]` and
/// `["a", "bc"]` fingerprint differently.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Derive a deterministic token identifier from the stable issuance tuple.
///
/// UUIDv5 over [`DERIVATION_NAMESPACE`]: re-issuing for the same subject,
/// same claims fingerprint and same issuance bucket yields the same JTI, so
/// a retried issuance cannot mint a second independently-revocable token.
pub fn derive_jti(subject: &str, claims_fingerprint: &str, bucket: i64) -> Jti {
    let name = format!("{subject}|{claims_fingerprint}|{bucket}");
    Jti(Uuid::new_v5(&DERIVATION_NAMESPACE, name.as_bytes()))
}

/// Record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Pending,
    Completed,
    Failed,
}

/// One idempotency record, stored as JSON in the shared backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub status: IdempotencyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What to do when a concurrent duplicate finds a pending record
#[derive(Debug, Clone, Copy)]
pub enum DuplicatePolicy {
    /// Poll up to the given timeout for the in-flight execution to finish,
    /// then replay its result
    Wait(Duration),
    /// Report the conflict immediately
    Conflict,
}

/// Result of an idempotent execution
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    /// Whether the value was replayed from a prior execution
    pub replayed: bool,
}

/// Idempotency errors
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A duplicate is in flight and the policy chose not to (or timed out
    /// waiting to) replay it
    #[error("operation already in progress: {key}")]
    Conflict { key: String },

    /// The retry budget for this key is spent
    #[error("operation {key} failed after {attempts} attempts")]
    AttemptsExhausted { key: String, attempts: u32 },

    /// The operation itself failed (recorded for replay)
    #[error("operation failed: {message}")]
    Operation { message: String },

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<IdempotencyError> for AuthError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::Store(e) => e.into(),
            IdempotencyError::Conflict { key } => AuthError::Conflict { key },
            IdempotencyError::AttemptsExhausted { attempts, .. } => {
                AuthError::AttemptsExhausted { attempts }
            }
            IdempotencyError::Operation { message } => AuthError::Internal(message),
            IdempotencyError::Serialization(e) => AuthError::Internal(e.to_string()),
        }
    }
}

/// Statistics for the observability surface
#[derive(Debug, Clone, Serialize)]
pub struct IdempotencyStats {
    pub retention_secs: u64,
    pub pending_timeout_secs: u64,
    pub max_attempts: u32,
}

/// A failed record surfaced on the administrative surface
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub key: String,
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

enum Claim {
    /// We own the pending record; run the operation with this attempt count
    Owned { attempts: u32 },
    /// A prior execution completed; replay its stored value
    Replay(serde_json::Value),
}

/// Deduplicates operations across instances via the shared backend
pub struct IdempotencyManager {
    backend: Arc<dyn KeyValueStore>,
    retention: Duration,
    pending_timeout: Duration,
    max_attempts: u32,
    poll_interval: Duration,
}

impl IdempotencyManager {
    /// Create a manager over the given backend
    pub fn new(backend: Arc<dyn KeyValueStore>, config: &AuthConfig) -> Self {
        Self {
            backend,
            retention: config.idempotency_retention,
            pending_timeout: config.pending_timeout,
            max_attempts: config.max_attempts.max(1),
            poll_interval: Duration::from_millis(50),
        }
    }

    fn record_key(key: &str) -> String {
        format!("{}{}", namespace::IDEMPOTENCY, key)
    }

    /// Execute `op` at most once for `key`.
    ///
    /// - No record: claim `pending`, run `op`, store `completed`/`failed`.
    /// - `completed`: replay the stored result; `op` is not run.
    /// - `pending`: wait-then-replay or conflict, per `policy`. Pending
    ///   records older than the pending timeout are reclaimed, which covers
    ///   executions that died without releasing the record.
    /// - `failed`: re-execute only when `retry_failed` is set, bounded by the
    ///   configured attempt budget; otherwise the stored failure is replayed.
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        policy: DuplicatePolicy,
        retry_failed: bool,
        op: F,
    ) -> Result<Outcome<T>, IdempotencyError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let record_key = Self::record_key(key);

        let claim = self.resolve_claim(key, &record_key, policy, retry_failed).await?;
        let attempts = match claim {
            Claim::Replay(value) => {
                tracing::debug!(key, "Replaying stored idempotent result");
                let value: T = serde_json::from_value(value)?;
                return Ok(Outcome {
                    value,
                    replayed: true,
                });
            }
            Claim::Owned { attempts } => attempts,
        };

        match op().await {
            Ok(value) => {
                let stored = serde_json::to_value(&value)?;
                self.store_terminal(
                    &record_key,
                    IdempotencyStatus::Completed,
                    Some(stored),
                    None,
                    attempts,
                )
                .await?;
                Ok(Outcome {
                    value,
                    replayed: false,
                })
            }
            Err(e) => {
                let message = e.to_string();
                self.store_terminal(
                    &record_key,
                    IdempotencyStatus::Failed,
                    None,
                    Some(message.clone()),
                    attempts,
                )
                .await?;
                tracing::warn!(key, attempts, error = %message, "Idempotent operation failed");
                Err(IdempotencyError::Operation { message })
            }
        }
    }

    /// Resolve the current record into an owned claim or a replayable result
    async fn resolve_claim(
        &self,
        key: &str,
        record_key: &str,
        policy: DuplicatePolicy,
        retry_failed: bool,
    ) -> Result<Claim, IdempotencyError> {
        let mut prior_attempts = 0u32;
        let wait_deadline = match policy {
            DuplicatePolicy::Wait(timeout) => Some(tokio::time::Instant::now() + timeout),
            DuplicatePolicy::Conflict => None,
        };

        loop {
            let attempts = prior_attempts + 1;
            if self.try_claim(record_key, attempts).await? {
                return Ok(Claim::Owned { attempts });
            }

            let Some(record) = self.load(record_key).await? else {
                // Record expired between the failed claim and the read
                continue;
            };

            match record.status {
                IdempotencyStatus::Completed => {
                    let value = record.result.ok_or_else(|| StoreError::Corrupt {
                        key: record_key.to_string(),
                        detail: "completed record without result".to_string(),
                    })?;
                    return Ok(Claim::Replay(value));
                }
                IdempotencyStatus::Failed => {
                    if !retry_failed {
                        return Err(IdempotencyError::Operation {
                            message: record
                                .error
                                .unwrap_or_else(|| "unknown failure".to_string()),
                        });
                    }
                    if record.attempts >= self.max_attempts {
                        return Err(IdempotencyError::AttemptsExhausted {
                            key: key.to_string(),
                            attempts: record.attempts,
                        });
                    }
                    prior_attempts = record.attempts;
                    // Delete-then-claim: only one concurrent retrier wins the
                    // subsequent set-nx; the rest fall into the pending arm.
                    self.backend.delete(record_key).await?;
                }
                IdempotencyStatus::Pending => {
                    let age = Utc::now() - record.created_at;
                    if age.num_seconds() >= self.pending_timeout.as_secs() as i64 {
                        tracing::warn!(key, "Reclaiming stale pending record");
                        prior_attempts = record.attempts;
                        self.backend.delete(record_key).await?;
                        continue;
                    }

                    let Some(deadline) = wait_deadline else {
                        return Err(IdempotencyError::Conflict {
                            key: key.to_string(),
                        });
                    };
                    if tokio::time::Instant::now() >= deadline {
                        return Err(IdempotencyError::Conflict {
                            key: key.to_string(),
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn try_claim(&self, record_key: &str, attempts: u32) -> Result<bool, IdempotencyError> {
        let now = Utc::now();
        let record = IdempotencyRecord {
            status: IdempotencyStatus::Pending,
            result: None,
            error: None,
            attempts,
            created_at: now,
            expires_at: now + chrono::TimeDelta::seconds(self.retention.as_secs() as i64),
        };
        let value = serde_json::to_string(&record)?;
        Ok(self
            .backend
            .set_nx_ex(record_key, &value, self.retention)
            .await?)
    }

    async fn store_terminal(
        &self,
        record_key: &str,
        status: IdempotencyStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
        attempts: u32,
    ) -> Result<(), IdempotencyError> {
        let now = Utc::now();
        let record = IdempotencyRecord {
            status,
            result,
            error,
            attempts,
            created_at: now,
            expires_at: now + chrono::TimeDelta::seconds(self.retention.as_secs() as i64),
        };
        let value = serde_json::to_string(&record)?;
        self.backend
            .set_ex(record_key, &value, self.retention)
            .await?;
        Ok(())
    }

    async fn load(&self, record_key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let Some(raw) = self.backend.get(record_key).await? else {
            return Ok(None);
        };
        let record =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key: record_key.to_string(),
                detail: e.to_string(),
            })?;
        Ok(Some(record))
    }

    /// List failed records for the administrative surface
    pub async fn list_failed(&self, limit: usize) -> Result<Vec<FailedRecord>, IdempotencyError> {
        let keys = self
            .backend
            .scan_prefix(namespace::IDEMPOTENCY, limit.saturating_mul(4))
            .await?;

        let mut failed = Vec::new();
        for key in keys {
            if failed.len() >= limit {
                break;
            }
            if let Some(record) = self.load(&key).await?
                && record.status == IdempotencyStatus::Failed
            {
                failed.push(FailedRecord {
                    key: key
                        .strip_prefix(namespace::IDEMPOTENCY)
                        .unwrap_or(&key)
                        .to_string(),
                    error: record.error,
                    attempts: record.attempts,
                    created_at: record.created_at,
                });
            }
        }
        Ok(failed)
    }

    /// Statistics snapshot for monitoring
    pub fn stats(&self) -> IdempotencyStats {
        IdempotencyStats {
            retention_secs: self.retention.as_secs(),
            pending_timeout_secs: self.pending_timeout.as_secs(),
            max_attempts: self.max_attempts,
        }
    }
}

impl std::fmt::Debug for IdempotencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyManager")
            .field("retention", &self.retention)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
