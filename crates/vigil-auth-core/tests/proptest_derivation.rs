//! Property tests for deterministic identifier derivation

use proptest::prelude::*;
use vigil_auth_core::idempotency::{derive_jti, fingerprint};

proptest! {
    /// Same inputs always derive the same JTI
    #[test]
    fn derivation_is_deterministic(
        subject in "[a-zA-Z0-9_-]{1,32}",
        claims_fp in "[a-f0-9]{64}",
        bucket in 0i64..10_000_000,
    ) {
        let a = derive_jti(&subject, &claims_fp, bucket);
        let b = derive_jti(&subject, &claims_fp, bucket);
        prop_assert_eq!(a, b);
    }

    /// Adjacent buckets never collide for the same subject and claims
    #[test]
    fn adjacent_buckets_differ(
        subject in "[a-zA-Z0-9_-]{1,32}",
        claims_fp in "[a-f0-9]{64}",
        bucket in 0i64..10_000_000,
    ) {
        let a = derive_jti(&subject, &claims_fp, bucket);
        let b = derive_jti(&subject, &claims_fp, bucket + 1);
        prop_assert_ne!(a, b);
    }

    /// Different subjects never collide in the same bucket
    #[test]
    fn subjects_differ(
        subject in "[a-zA-Z0-9_-]{1,32}",
        claims_fp in "[a-f0-9]{64}",
        bucket in 0i64..10_000_000,
    ) {
        let other = format!("{subject}x");
        let a = derive_jti(&subject, &claims_fp, bucket);
        let b = derive_jti(&other, &claims_fp, bucket);
        prop_assert_ne!(a, b);
    }

    /// Fingerprints are stable and sensitive to every part
    #[test]
    fn fingerprint_is_stable(parts in prop::collection::vec("[a-zA-Z0-9:,._-]{0,24}", 1..6)) {
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        prop_assert_eq!(fingerprint(&refs), fingerprint(&refs));
    }

    /// Part boundaries matter: joining two parts changes the fingerprint
    #[test]
    fn fingerprint_respects_boundaries(
        a in "[a-z]{1,12}",
        b in "[a-z]{1,12}",
    ) {
        let joined = format!("{a}{b}");
        prop_assert_ne!(fingerprint(&[&a, &b]), fingerprint(&[&joined]));
    }
}
