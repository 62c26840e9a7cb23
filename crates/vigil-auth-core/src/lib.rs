//! Vigil Auth Core - Authentication security core
//!
//! Distributed token issuance, validation and revocation for stateless
//! service instances sharing one optionally-available backend:
//!
//! - [`revocation`]: revocation store with local degraded-mode fallback
//! - [`crypto`]: timing-safe comparison and HMAC signing primitives
//! - [`idempotency`]: deterministic operation deduplication
//! - [`token`]: token manager composing the three above
//! - [`api_key`]: legacy static-credential path
//! - [`service`]: facade tying the credential paths together

pub mod api_key;
pub mod config;
pub mod crypto;
pub mod error;
pub mod idempotency;
pub mod limiter;
pub mod revocation;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use service::{AuthService, SecurityStats};
