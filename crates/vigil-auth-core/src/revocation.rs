//! Distributed token revocation store
//!
//! Revocations are written to the shared backend with a TTL matching the
//! token's remaining lifetime, so the revocation list cleans itself up. When
//! the backend is unreachable the store degrades to an instance-local
//! fallback cache: revocations issued here stay visible here immediately,
//! while revocations issued on other instances during the outage become
//! visible once the backend recovers. That gap is a documented property of
//! degraded mode, not a defect; `health()` reports it truthfully.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vigil_store::{KeyValueStore, StoreResult, namespace};
use vigil_types::{Jti, SubjectId};

use crate::config::AuthConfig;
use crate::crypto::hash_credential;

/// Which backend answered (or would answer) revocation queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationBackend {
    /// The shared backend
    Shared,
    /// The instance-local fallback cache
    Local,
}

/// Health snapshot of the revocation store
#[derive(Debug, Clone, Serialize)]
pub struct RevocationHealth {
    /// Backend currently in use
    pub backend: RevocationBackend,
    /// Whether the shared backend answered the liveness probe
    pub available: bool,
}

/// Statistics for the observability surface
#[derive(Debug, Clone, Serialize)]
pub struct RevocationStats {
    pub backend: RevocationBackend,
    pub fallback_entries: u64,
    pub degraded: bool,
}

/// Audit metadata stored with each revocation record
#[derive(Debug, Serialize, Deserialize)]
struct RevocationRecord {
    revoked_at: DateTime<Utc>,
    subject: Option<String>,
    reason: String,
    valid_until: DateTime<Utc>,
}

/// Revocation store with shared backend and local degraded-mode fallback
pub struct RevocationStore {
    backend: Arc<dyn KeyValueStore>,
    /// hashed JTI -> valid-until; advisory only, never authoritative once
    /// the backend recovers
    fallback: Cache<String, DateTime<Utc>>,
    degraded: AtomicBool,
}

impl RevocationStore {
    /// Create a revocation store over the given backend
    pub fn new(backend: Arc<dyn KeyValueStore>, config: &AuthConfig) -> Self {
        Self {
            backend,
            fallback: Cache::builder()
                .max_capacity(config.fallback_cache_capacity)
                .time_to_live(config.fallback_cache_ttl)
                .build(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Backend key for a JTI.
    ///
    /// JTIs are hashed so backend keys have constant length and never carry
    /// raw token identifiers.
    fn key(jti: &Jti) -> String {
        format!("{}{}", namespace::REVOKED, hash_credential(&jti.to_string()))
    }

    /// Revoke a token identifier through `valid_until`.
    ///
    /// Never fails the caller: on backend failure the revocation lands in the
    /// local fallback cache and the store flags degraded mode. The fallback
    /// is always mirrored so the revoking instance sees the revocation
    /// immediately regardless of backend state.
    pub async fn revoke(
        &self,
        jti: &Jti,
        valid_until: DateTime<Utc>,
        subject: Option<&SubjectId>,
        reason: &str,
    ) {
        let now = Utc::now();
        let remaining = valid_until - now;
        if remaining <= chrono::TimeDelta::zero() {
            tracing::debug!(jti = %jti, "Token already expired, skipping revocation");
            return;
        }

        let ttl = Duration::from_secs(remaining.num_seconds().max(1) as u64);
        let record = RevocationRecord {
            revoked_at: now,
            subject: subject.map(|s| s.to_string()),
            reason: reason.to_string(),
            valid_until,
        };
        let value = serde_json::to_string(&record).unwrap_or_default();
        let key = Self::key(jti);

        self.fallback.insert(key.clone(), valid_until).await;

        match self.backend.set_ex(&key, &value, ttl).await {
            Ok(()) => {
                self.degraded.store(false, Ordering::Relaxed);
                tracing::info!(jti = %jti, reason, ttl_secs = ttl.as_secs(), "Token revoked");
            }
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(
                    jti = %jti,
                    reason,
                    error = %e,
                    "Backend revocation failed; revocation held in local fallback only \
                     and is not visible to other instances until the backend recovers"
                );
            }
        }
    }

    /// Check whether a token identifier has been revoked.
    ///
    /// Queries the shared backend first; on failure consults the local
    /// fallback. The fallback always yields an answer (absence means "not
    /// revoked as far as this instance knows"), so this never fails.
    pub async fn is_revoked(&self, jti: &Jti) -> bool {
        let key = Self::key(jti);

        match self.backend.exists(&key).await {
            Ok(true) => {
                self.degraded.store(false, Ordering::Relaxed);
                true
            }
            Ok(false) => {
                self.degraded.store(false, Ordering::Relaxed);
                // A fallback hit here means the revocation was written during
                // an outage and never reached the backend: repair it.
                if let Some(valid_until) = self.fallback_hit(&key).await {
                    self.republish(&key, valid_until).await;
                    return true;
                }
                false
            }
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(error = %e, "Backend revocation check failed, using local fallback");
                self.fallback_hit(&key).await.is_some()
            }
        }
    }

    /// Probe the shared backend and report health truthfully
    pub async fn health(&self) -> RevocationHealth {
        match self.backend.ping().await {
            Ok(()) => {
                self.degraded.store(false, Ordering::Relaxed);
                RevocationHealth {
                    backend: RevocationBackend::Shared,
                    available: true,
                }
            }
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                tracing::warn!(error = %e, "Shared backend health probe failed");
                RevocationHealth {
                    backend: RevocationBackend::Local,
                    available: false,
                }
            }
        }
    }

    /// Statistics snapshot for monitoring
    pub fn stats(&self) -> RevocationStats {
        let degraded = self.degraded.load(Ordering::Relaxed);
        RevocationStats {
            backend: if degraded {
                RevocationBackend::Local
            } else {
                RevocationBackend::Shared
            },
            fallback_entries: self.fallback.entry_count(),
            degraded,
        }
    }

    /// Whether the store last saw the backend as unreachable
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Fallback lookup honoring each entry's own valid-until
    async fn fallback_hit(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.fallback.get(key).await {
            Some(valid_until) if valid_until > Utc::now() => Some(valid_until),
            Some(_) => {
                self.fallback.invalidate(key).await;
                None
            }
            None => None,
        }
    }

    /// Write a fallback-only revocation back to the recovered backend
    async fn republish(&self, key: &str, valid_until: DateTime<Utc>) {
        let remaining = valid_until - Utc::now();
        if remaining <= chrono::TimeDelta::zero() {
            return;
        }
        let ttl = Duration::from_secs(remaining.num_seconds().max(1) as u64);
        let record = RevocationRecord {
            revoked_at: Utc::now(),
            subject: None,
            reason: "fallback_replay".to_string(),
            valid_until,
        };
        let value = serde_json::to_string(&record).unwrap_or_default();
        let result: StoreResult<()> = self.backend.set_ex(key, &value, ttl).await;
        match result {
            Ok(()) => tracing::info!("Replayed fallback revocation to recovered backend"),
            Err(e) => tracing::warn!(error = %e, "Failed to replay fallback revocation"),
        }
    }
}

impl std::fmt::Debug for RevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationStore")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use uuid::Uuid;
    use vigil_store::{MemoryStore, StoreError};

    /// Backend wrapper that can be switched off to simulate an outage
    struct FlakyBackend {
        inner: MemoryStore,
        available: AtomicBool,
    }

    impl FlakyBackend {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                available: AtomicBool::new(true),
            }
        }

        fn set_available(&self, up: bool) {
            self.available.store(up, Ordering::SeqCst);
        }

        fn check(&self) -> StoreResult<()> {
            if self.available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Unavailable("simulated outage".into()))
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyBackend {
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
            self.check()?;
            self.inner.set_ex(key, value, ttl).await
        }

        async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
            self.check()?;
            self.inner.set_nx_ex(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn exists(&self, key: &str) -> StoreResult<bool> {
            self.check()?;
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }

        async fn scan_prefix(&self, prefix: &str, limit: usize) -> StoreResult<Vec<String>> {
            self.check()?;
            self.inner.scan_prefix(prefix, limit).await
        }

        async fn ping(&self) -> StoreResult<()> {
            self.check()?;
            self.inner.ping().await
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::new("a-secret-that-is-at-least-32-bytes!!")
    }

    fn fresh_jti() -> Jti {
        Jti(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_revoke_then_check() {
        let backend = Arc::new(MemoryStore::new());
        let store = RevocationStore::new(backend, &config());

        let jti = fresh_jti();
        assert!(!store.is_revoked(&jti).await);

        store
            .revoke(&jti, Utc::now() + chrono::TimeDelta::hours(1), None, "user_logout")
            .await;
        assert!(store.is_revoked(&jti).await);
        assert!(!store.is_degraded());
    }

    #[tokio::test]
    async fn test_expired_revocation_is_noop() {
        let backend = Arc::new(MemoryStore::new());
        let store = RevocationStore::new(backend.clone(), &config());

        let jti = fresh_jti();
        store
            .revoke(&jti, Utc::now() - chrono::TimeDelta::hours(1), None, "user_logout")
            .await;
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_degraded_revocation_visible_on_same_instance() {
        let backend = Arc::new(FlakyBackend::new());
        let store = RevocationStore::new(backend.clone(), &config());

        backend.set_available(false);
        let jti = fresh_jti();
        store
            .revoke(&jti, Utc::now() + chrono::TimeDelta::hours(1), None, "user_logout")
            .await;

        // Backend still down: local fallback answers
        assert!(store.is_revoked(&jti).await);
        assert!(store.is_degraded());
    }

    #[tokio::test]
    async fn test_degraded_revocation_invisible_on_other_instance() {
        let backend = Arc::new(FlakyBackend::new());
        let instance_a = RevocationStore::new(backend.clone(), &config());
        let instance_b = RevocationStore::new(backend.clone(), &config());

        backend.set_available(false);
        let jti = fresh_jti();
        instance_a
            .revoke(&jti, Utc::now() + chrono::TimeDelta::hours(1), None, "user_logout")
            .await;

        // Documented gap: another instance cannot see it during the outage
        assert!(!instance_b.is_revoked(&jti).await);
    }

    #[tokio::test]
    async fn test_fallback_revocation_republished_after_recovery() {
        let backend = Arc::new(FlakyBackend::new());
        let store = RevocationStore::new(backend.clone(), &config());

        backend.set_available(false);
        let jti = fresh_jti();
        store
            .revoke(&jti, Utc::now() + chrono::TimeDelta::hours(1), None, "user_logout")
            .await;

        backend.set_available(true);
        // First check after recovery repairs the backend record
        assert!(store.is_revoked(&jti).await);
        assert!(!store.is_degraded());

        // A different instance now sees it too
        let other = RevocationStore::new(backend.clone(), &config());
        assert!(other.is_revoked(&jti).await);
    }

    #[tokio::test]
    async fn test_health_reports_degraded_truthfully() {
        let backend = Arc::new(FlakyBackend::new());
        let store = RevocationStore::new(backend.clone(), &config());

        let health = store.health().await;
        assert!(health.available);
        assert_eq!(health.backend, RevocationBackend::Shared);

        backend.set_available(false);
        let health = store.health().await;
        assert!(!health.available);
        assert_eq!(health.backend, RevocationBackend::Local);
    }
}
