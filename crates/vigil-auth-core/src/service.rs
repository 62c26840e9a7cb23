//! Auth service - ties together token validation, revocation, idempotent
//! issuance and the legacy static-key path

use serde::Serialize;
use std::sync::Arc;

use vigil_store::KeyValueStore;
use vigil_types::{AuthenticatedSubject, SubjectId, Tier};

use crate::api_key::{API_KEY_PREFIX, ApiKeyValidator};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::idempotency::{IdempotencyManager, IdempotencyStats, Outcome};
use crate::limiter::ValidationLimiter;
use crate::revocation::{RevocationHealth, RevocationStats, RevocationStore};
use crate::token::{IssuedTokens, TokenManager};

/// Aggregated security statistics for the observability surface
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStats {
    pub revocation: RevocationStats,
    pub idempotency: IdempotencyStats,
    pub jitter_window_ms: (u64, u64),
    pub rate_limit_per_minute: u32,
}

/// Authentication service
///
/// Provides a unified interface for:
/// - Token issuance (idempotent, deterministic JTI)
/// - Bearer credential validation (JWT and legacy static keys)
/// - Revocation with degraded-mode fallback
pub struct AuthService {
    config: AuthConfig,
    tokens: TokenManager,
    api_keys: ApiKeyValidator,
    revocations: Arc<RevocationStore>,
    idempotency: Arc<IdempotencyManager>,
    limiter: ValidationLimiter,
}

impl AuthService {
    /// Create an auth service over the given shared backend
    pub fn new(config: AuthConfig, backend: Arc<dyn KeyValueStore>) -> AuthResult<Self> {
        let revocations = Arc::new(RevocationStore::new(Arc::clone(&backend), &config));
        let idempotency = Arc::new(IdempotencyManager::new(Arc::clone(&backend), &config));
        let tokens = TokenManager::new(
            config.clone(),
            Arc::clone(&revocations),
            Arc::clone(&idempotency),
        )?;
        let api_keys = ApiKeyValidator::new(backend, tokens.comparator());
        let limiter = ValidationLimiter::new(config.rate_limit_per_minute);

        Ok(Self {
            config,
            tokens,
            api_keys,
            revocations,
            idempotency,
            limiter,
        })
    }

    // =========================================================================
    // Issuance and lifecycle
    // =========================================================================

    /// Issue an access/refresh token pair
    pub async fn issue(
        &self,
        subject: &SubjectId,
        tier: Tier,
        scopes: &[String],
    ) -> AuthResult<Outcome<IssuedTokens>> {
        self.tokens.issue(subject, tier, scopes).await
    }

    /// Rotate a refresh token into a fresh pair
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<Outcome<IssuedTokens>> {
        self.tokens.refresh(refresh_token).await
    }

    /// Revoke a token or bare JTI
    pub async fn revoke(&self, token_or_jti: &str, reason: &str) -> AuthResult<()> {
        self.tokens.revoke(token_or_jti, reason).await
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate a bearer credential, auto-detecting its kind.
    ///
    /// JWTs have two dots; legacy static keys carry the `vg_` prefix.
    /// `client_key` (typically the caller IP) feeds the attempt limiter;
    /// limited and malformed requests still receive the comparator's jitter
    /// so their latency blends with real validation.
    pub async fn validate_bearer(
        &self,
        credential: &str,
        client_key: &str,
    ) -> AuthResult<AuthenticatedSubject> {
        if let Err(e) = self.limiter.check(client_key).await {
            self.tokens.comparator().apply_jitter().await;
            return Err(e);
        }

        let dot_count = credential.chars().filter(|c| *c == '.').count();
        if dot_count == 2 {
            return self.tokens.validate(credential).await;
        }
        if credential.starts_with(API_KEY_PREFIX) {
            return self.api_keys.validate(credential).await;
        }

        self.tokens.comparator().apply_jitter().await;
        Err(AuthError::Malformed)
    }

    // =========================================================================
    // Component access and observability
    // =========================================================================

    /// Token manager (direct access for tests and internal wiring)
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Static API key validator (admin surface)
    pub fn api_keys(&self) -> &ApiKeyValidator {
        &self.api_keys
    }

    /// Idempotency manager (admin surface, webhook processing)
    pub fn idempotency(&self) -> Arc<IdempotencyManager> {
        Arc::clone(&self.idempotency)
    }

    /// Revocation store health (probes the backend)
    pub async fn revocation_health(&self) -> RevocationHealth {
        self.revocations.health().await
    }

    /// Aggregated security statistics
    pub fn security_stats(&self) -> SecurityStats {
        SecurityStats {
            revocation: self.revocations.stats(),
            idempotency: self.idempotency.stats(),
            jitter_window_ms: (
                self.config.jitter_min.as_millis() as u64,
                self.config.jitter_max.as_millis() as u64,
            ),
            rate_limit_per_minute: self.config.rate_limit_per_minute,
        }
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}
