//! Legacy static-credential path
//!
//! Long-lived API keys predate the JWT scheme and remain supported as a
//! simpler authentication path: a `vg_`-prefixed secret whose SHA-256 hash
//! addresses a record in the shared backend. Validity is the record's own
//! active flag plus optional expiry; there is no revocation-store lookup.
//! Both paths converge on [`AuthenticatedSubject`].

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use vigil_store::{KeyValueStore, namespace};
use vigil_types::{AuthenticatedSubject, CredentialSource, SubjectId, Tier};

use crate::crypto::{TimingSafeComparator, hash_credential};
use crate::error::{AuthError, AuthResult};

/// Prefix identifying a static API key without exposing it
pub const API_KEY_PREFIX: &str = "vg_";

/// TTL for keys without an explicit expiry (records are refreshed on write)
const UNBOUNDED_KEY_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Stored API key record (the key itself is never stored, only its hash
/// addresses the record)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub subject: SubjectId,
    pub tier: Tier,
    pub scopes: Vec<String>,
    /// Human-readable label
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl ApiKeyRecord {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }
}

/// Validates and manages static API keys
pub struct ApiKeyValidator {
    backend: Arc<dyn KeyValueStore>,
    comparator: TimingSafeComparator,
}

impl ApiKeyValidator {
    pub fn new(backend: Arc<dyn KeyValueStore>, comparator: TimingSafeComparator) -> Self {
        Self { backend, comparator }
    }

    fn record_key(key_hash: &str) -> String {
        format!("{}{}", namespace::API_KEY, key_hash)
    }

    /// Validate a presented API key.
    ///
    /// Every outcome, including unknown keys and backend failures, gets the
    /// comparator's jitter so latency does not reveal which stage rejected
    /// the key.
    pub async fn validate(&self, presented: &str) -> AuthResult<AuthenticatedSubject> {
        let result = self.lookup(presented).await;
        self.comparator.apply_jitter().await;
        result
    }

    async fn lookup(&self, presented: &str) -> AuthResult<AuthenticatedSubject> {
        if !presented.starts_with(API_KEY_PREFIX) {
            return Err(AuthError::InvalidApiKey);
        }

        let key_hash = hash_credential(presented);
        let raw = self
            .backend
            .get(&Self::record_key(&key_hash))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "API key lookup failed");
                AuthError::StoreUnavailable
            })?;

        let Some(raw) = raw else {
            return Err(AuthError::InvalidApiKey);
        };
        let record: ApiKeyRecord =
            serde_json::from_str(&raw).map_err(|e| AuthError::Internal(e.to_string()))?;

        if !record.active || record.is_expired() {
            tracing::debug!(name = %record.name, "Rejected inactive or expired API key");
            return Err(AuthError::InvalidApiKey);
        }

        Ok(AuthenticatedSubject {
            subject: record.subject,
            tier: record.tier,
            scopes: record.scopes,
            source: CredentialSource::ApiKey,
            jti: None,
            expires_at: record.expires_at,
        })
    }

    /// Mint a new API key for `subject` and store its record.
    ///
    /// Returns the plaintext key exactly once; only the hash is retained.
    pub async fn create(
        &self,
        subject: SubjectId,
        tier: Tier,
        scopes: Vec<String>,
        name: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<String> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let plaintext = format!("{API_KEY_PREFIX}{}", hex::encode(secret));

        let record = ApiKeyRecord {
            subject,
            tier,
            scopes,
            name,
            created_at: Utc::now(),
            expires_at,
            active: true,
        };
        self.put(&plaintext, &record).await?;
        tracing::info!(name = %record.name, subject = %record.subject, "Created API key");
        Ok(plaintext)
    }

    /// Deactivate a key given its plaintext form
    pub async fn deactivate(&self, presented: &str) -> AuthResult<()> {
        let key_hash = hash_credential(presented);
        let record_key = Self::record_key(&key_hash);

        let raw = self
            .backend
            .get(&record_key)
            .await
            .map_err(|_| AuthError::StoreUnavailable)?
            .ok_or(AuthError::InvalidApiKey)?;
        let mut record: ApiKeyRecord =
            serde_json::from_str(&raw).map_err(|e| AuthError::Internal(e.to_string()))?;

        record.active = false;
        self.put(presented, &record).await?;
        tracing::info!(name = %record.name, "Deactivated API key");
        Ok(())
    }

    async fn put(&self, plaintext: &str, record: &ApiKeyRecord) -> AuthResult<()> {
        let ttl = match record.expires_at {
            Some(at) => {
                let remaining = at - Utc::now();
                Duration::from_secs(remaining.num_seconds().max(1) as u64)
            }
            None => UNBOUNDED_KEY_TTL,
        };
        let value =
            serde_json::to_string(record).map_err(|e| AuthError::Internal(e.to_string()))?;
        self.backend
            .set_ex(&Self::record_key(&hash_credential(plaintext)), &value, ttl)
            .await
            .map_err(|_| AuthError::StoreUnavailable)?;
        Ok(())
    }
}

impl std::fmt::Debug for ApiKeyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyValidator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_store::MemoryStore;

    fn validator() -> ApiKeyValidator {
        ApiKeyValidator::new(
            Arc::new(MemoryStore::new()),
            TimingSafeComparator::new(Duration::ZERO, Duration::ZERO),
        )
    }

    fn subject(s: &str) -> SubjectId {
        SubjectId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let v = validator();
        let key = v
            .create(
                subject("u1"),
                Tier::Pro,
                vec!["read".to_string()],
                "ci key".to_string(),
                None,
            )
            .await
            .unwrap();
        assert!(key.starts_with(API_KEY_PREFIX));

        let authenticated = v.validate(&key).await.unwrap();
        assert_eq!(authenticated.subject.as_str(), "u1");
        assert_eq!(authenticated.source, CredentialSource::ApiKey);
        assert!(authenticated.jti.is_none());
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let v = validator();
        assert!(matches!(
            v.validate("vg_0000000000000000").await,
            Err(AuthError::InvalidApiKey)
        ));
        assert!(matches!(
            v.validate("not-even-prefixed").await,
            Err(AuthError::InvalidApiKey)
        ));
    }

    #[tokio::test]
    async fn test_deactivated_key_rejected() {
        let v = validator();
        let key = v
            .create(subject("u1"), Tier::Free, vec![], "old key".to_string(), None)
            .await
            .unwrap();

        v.deactivate(&key).await.unwrap();
        assert!(matches!(
            v.validate(&key).await,
            Err(AuthError::InvalidApiKey)
        ));
    }

    #[tokio::test]
    async fn test_expired_key_rejected() {
        let v = validator();
        let key = v
            .create(
                subject("u1"),
                Tier::Free,
                vec![],
                "expired".to_string(),
                Some(Utc::now() + chrono::TimeDelta::seconds(2)),
            )
            .await
            .unwrap();

        // Force the stored record past its expiry without waiting
        let mut record: ApiKeyRecord = {
            let raw = v
                .backend
                .get(&ApiKeyValidator::record_key(&hash_credential(&key)))
                .await
                .unwrap()
                .unwrap();
            serde_json::from_str(&raw).unwrap()
        };
        record.expires_at = Some(Utc::now() - chrono::TimeDelta::seconds(1));
        v.put(&key, &record).await.unwrap();

        assert!(matches!(
            v.validate(&key).await,
            Err(AuthError::InvalidApiKey)
        ));
    }
}
