//! # Sync Job Value Objects
//!
//! Payload integrity checksums and the exponential-backoff-with-jitter
//! schedule used for retries and lease reclamation (spec.md §4.8).

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 checksum over the canonical JSON bytes of a job's payload
/// (`payload_checksum`, spec.md §3), hex-encoded like the other
/// content-address hash in this workspace (`verification-engine`'s
/// document hashes).
pub fn payload_checksum(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Base 2s, cap 10 min, full jitter (spec.md §4.8: "backoff is exponential
/// with jitter, base 2 s, cap 10 min"). `attempt` is the attempt count
/// *after* the failure being scheduled for retry (first retry: `attempt = 1`).
pub fn backoff_with_jitter(attempt: i32) -> Duration {
    const BASE_SECS: f64 = 2.0;
    const CAP_SECS: f64 = 600.0;

    let exp = BASE_SECS * 2f64.powi((attempt - 1).max(0));
    let capped = exp.min(CAP_SECS);
    let jittered = rand::thread_rng().gen_range(0.0..=capped);
    Duration::milliseconds((jittered * 1000.0) as i64)
}

pub fn next_retry_at(attempt: i32) -> DateTime<Utc> {
    Utc::now() + backoff_with_jitter(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_checksum_is_deterministic() {
        let payload = json!({"a": 1, "b": "two"});
        assert_eq!(payload_checksum(&payload), payload_checksum(&payload));
    }

    #[test]
    fn test_payload_checksum_differs_by_content() {
        assert_ne!(payload_checksum(&json!({"a": 1})), payload_checksum(&json!({"a": 2})));
    }

    #[test]
    fn test_backoff_never_exceeds_cap() {
        for attempt in 1..20 {
            let delay = backoff_with_jitter(attempt);
            assert!(delay <= Duration::seconds(600));
            assert!(delay >= Duration::zero());
        }
    }

    #[test]
    fn test_backoff_grows_with_attempt_ceiling() {
        // The jitter ceiling (not the sampled value) must grow monotonically
        // until it saturates at the cap.
        let ceiling = |attempt: i32| (2.0 * 2f64.powi((attempt - 1).max(0))).min(600.0);
        assert!(ceiling(1) < ceiling(2));
        assert!(ceiling(5) < ceiling(6));
        assert_eq!(ceiling(10), ceiling(11));
    }
}
