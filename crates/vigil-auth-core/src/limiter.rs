//! Validation-attempt rate limiting
//!
//! Caps how often a single client may attempt credential validation, so
//! token guessing cannot be brute-forced even below the comparator's timing
//! protections. Limiters are per-instance; the shared backend is not
//! consulted on this hot path.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AuthError, AuthResult};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-client validation attempt limiter
pub struct ValidationLimiter {
    limiters: RwLock<HashMap<String, Arc<DirectLimiter>>>,
    quota: Quota,
}

impl ValidationLimiter {
    /// Create a limiter allowing `per_minute` attempts per client key
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute.max(1)).expect("clamped to >= 1");
        Self {
            limiters: RwLock::new(HashMap::new()),
            quota: Quota::per_minute(per_minute),
        }
    }

    /// Check whether a validation attempt from `client_key` is allowed.
    ///
    /// `client_key` is typically the caller's IP address.
    pub async fn check(&self, client_key: &str) -> AuthResult<()> {
        let limiter = {
            let read_guard = self.limiters.read().await;
            if let Some(limiter) = read_guard.get(client_key) {
                Arc::clone(limiter)
            } else {
                drop(read_guard);

                let mut write_guard = self.limiters.write().await;
                // Double-check after acquiring write lock
                if let Some(limiter) = write_guard.get(client_key) {
                    Arc::clone(limiter)
                } else {
                    let limiter = Arc::new(RateLimiter::direct(self.quota));
                    write_guard.insert(client_key.to_string(), Arc::clone(&limiter));
                    limiter
                }
            }
        };

        match limiter.check() {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::warn!(client_key, "Validation rate limit exceeded");
                Err(AuthError::RateLimited)
            }
        }
    }

    /// Number of clients currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.limiters.read().await.len()
    }
}

impl std::fmt::Debug for ValidationLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_within_quota() {
        let limiter = ValidationLimiter::new(100);
        for _ in 0..10 {
            assert!(limiter.check("1.2.3.4").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_rejects_over_quota() {
        let limiter = ValidationLimiter::new(2);
        assert!(limiter.check("1.2.3.4").await.is_ok());
        assert!(limiter.check("1.2.3.4").await.is_ok());
        assert!(matches!(
            limiter.check("1.2.3.4").await,
            Err(AuthError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_clients_limited_independently() {
        let limiter = ValidationLimiter::new(1);
        assert!(limiter.check("1.1.1.1").await.is_ok());
        assert!(limiter.check("2.2.2.2").await.is_ok());
        assert_eq!(limiter.tracked_clients().await, 2);
    }
}
