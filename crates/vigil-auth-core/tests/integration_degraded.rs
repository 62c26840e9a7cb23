//! End-to-end degraded-mode behavior across the auth service
//!
//! The shared backend goes away mid-flight; legitimate tokens must keep
//! validating, same-instance revocations must hold, and operations with no
//! safe fallback must surface "cannot verify" rather than guessing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FlakyBackend;
use vigil_auth_core::{AuthConfig, AuthError, AuthService};
use vigil_types::{SubjectId, Tier};

fn config() -> AuthConfig {
    AuthConfig::new("a-secret-that-is-at-least-32-bytes!!")
        .with_jitter_window(Duration::ZERO, Duration::from_millis(1))
        .with_issue_bucket(Duration::from_secs(3600))
}

fn subject(s: &str) -> SubjectId {
    SubjectId::parse(s).unwrap()
}

#[tokio::test]
async fn tokens_keep_validating_through_an_outage() {
    let backend = FlakyBackend::new();
    let svc = AuthService::new(config(), backend.clone()).unwrap();

    let issued = svc.issue(&subject("u1"), Tier::Team, &[]).await.unwrap();

    backend.set_available(false);
    let authenticated = svc
        .validate_bearer(&issued.value.access_token, "1.2.3.4")
        .await
        .unwrap();
    assert_eq!(authenticated.subject.as_str(), "u1");
}

#[tokio::test]
async fn same_instance_revocation_holds_during_outage() {
    let backend = FlakyBackend::new();
    let svc = AuthService::new(config(), backend.clone()).unwrap();

    let issued = svc.issue(&subject("u1"), Tier::Team, &[]).await.unwrap();

    backend.set_available(false);
    svc.revoke(&issued.value.access_token, "user_logout")
        .await
        .unwrap();

    assert!(matches!(
        svc.validate_bearer(&issued.value.access_token, "1.2.3.4")
            .await,
        Err(AuthError::Revoked)
    ));
}

#[tokio::test]
async fn outage_revocation_invisible_to_fresh_instance_until_recovery() {
    let backend = FlakyBackend::new();
    let instance_a = AuthService::new(config(), backend.clone()).unwrap();

    let issued = instance_a
        .issue(&subject("u1"), Tier::Team, &[])
        .await
        .unwrap();

    backend.set_available(false);
    instance_a
        .revoke(&issued.value.access_token, "user_logout")
        .await
        .unwrap();

    // A never-before-used instance has no fallback entry: documented gap
    let instance_b = AuthService::new(config(), backend.clone()).unwrap();
    assert!(
        instance_b
            .validate_bearer(&issued.value.access_token, "1.2.3.4")
            .await
            .is_ok()
    );

    // After recovery, instance A's next check repairs the shared record and
    // instance B starts rejecting the token
    backend.set_available(true);
    assert!(matches!(
        instance_a
            .validate_bearer(&issued.value.access_token, "1.2.3.4")
            .await,
        Err(AuthError::Revoked)
    ));
    assert!(matches!(
        instance_b
            .validate_bearer(&issued.value.access_token, "1.2.3.4")
            .await,
        Err(AuthError::Revoked)
    ));
}

#[tokio::test]
async fn issuance_without_backend_surfaces_store_unavailable() {
    let backend = FlakyBackend::new();
    let svc = AuthService::new(config(), backend.clone()).unwrap();

    backend.set_available(false);
    // Idempotent issuance has no safe local fallback: deduplicating against
    // an instance-local store could mint duplicate credentials elsewhere.
    let result = svc.issue(&subject("u1"), Tier::Team, &[]).await;
    assert!(matches!(result, Err(AuthError::StoreUnavailable)));
}

#[tokio::test]
async fn health_reports_backend_state() {
    let backend = FlakyBackend::new();
    let svc = AuthService::new(config(), backend.clone()).unwrap();

    assert!(svc.revocation_health().await.available);

    backend.set_available(false);
    let health = svc.revocation_health().await;
    assert!(!health.available);
    assert!(svc.security_stats().revocation.degraded);
}
