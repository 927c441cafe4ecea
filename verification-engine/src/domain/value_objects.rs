//! # Verification Value Objects
//!
//! Content-addressing for uploaded documents and the canonical message
//! signed over a review decision (spec.md §4.7).

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 content address for a document's bytes, hex-encoded. Hex (not
/// base64url) because this hash is displayed/compared by operators and
/// storage tooling, unlike the opaque token hashes elsewhere in the
/// workspace.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The canonical payload signed by [`eid_crypto::signing::SignatureKeyRing`]
/// over a review decision, so the same string is produced at signing time
/// and at audit time.
pub fn decision_payload(request_id: Uuid, identity_id: Uuid, status: &str, reviewer_id: Uuid) -> Vec<u8> {
    format!("verification:{status}:request={request_id}:identity={identity_id}:reviewer={reviewer_id}")
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_deterministic() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
    }

    #[test]
    fn test_content_hash_differs_by_content() {
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
    }

    #[test]
    fn test_decision_payload_varies_by_status() {
        let request_id = Uuid::new_v4();
        let identity_id = Uuid::new_v4();
        let reviewer_id = Uuid::new_v4();

        let approved = decision_payload(request_id, identity_id, "approved", reviewer_id);
        let rejected = decision_payload(request_id, identity_id, "rejected", reviewer_id);
        assert_ne!(approved, rejected);
    }
}
