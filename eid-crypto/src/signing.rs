//! # Ed25519 Signing
//!
//! Signs and verifies non-repudiable records — verification decisions,
//! audit log entries, handle-transfer confirmations — per spec.md §4.1's
//! `sign`/`verify` operations.
//!
//! Ed25519 is used instead of RSA-OAEP: the pack carries no `rsa` signing
//! usage, keys are an order of magnitude smaller, and there's no hybrid
//! envelope scheme to maintain since Ed25519 signs arbitrary-length messages
//! directly (see DESIGN.md for the full Open Question resolution).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use shared::errors::ApiError;
use std::collections::HashMap;

/// A single Ed25519 signing key pair, identified by `key_id`.
#[derive(Clone)]
pub struct SigningKeyPair {
    key_id: String,
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Generates a fresh key pair with a CSPRNG. Used at key-provisioning
    /// time, not per request.
    pub fn generate(key_id: impl Into<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            key_id: key_id.into(),
            signing_key,
        }
    }

    /// Loads a key pair from a 32-byte seed (e.g. read from secret storage).
    pub fn from_seed(key_id: impl Into<String>, seed: [u8; 32]) -> Self {
        Self {
            key_id: key_id.into(),
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// Holds verifying keys by `key_id` so `verify` can check a signature
/// without needing the signing key that produced it.
#[derive(Clone, Default)]
pub struct SignatureKeyRing {
    signing_keys: HashMap<String, SigningKey>,
    verifying_keys: HashMap<String, VerifyingKey>,
    active_key_id: Option<String>,
}

impl SignatureKeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a key pair as the active signing key and a verification
    /// candidate.
    pub fn with_active_key(mut self, pair: SigningKeyPair) -> Self {
        self.verifying_keys
            .insert(pair.key_id.clone(), pair.verifying_key());
        self.active_key_id = Some(pair.key_id.clone());
        self.signing_keys.insert(pair.key_id, pair.signing_key);
        self
    }

    /// Registers a verification-only key (e.g. a retired key whose
    /// signatures must still validate).
    pub fn with_verifying_key(mut self, key_id: impl Into<String>, key: VerifyingKey) -> Self {
        self.verifying_keys.insert(key_id.into(), key);
        self
    }

    /// Signs `data` with the active signing key.
    ///
    /// Returns the base64url-encoded signature and the `key_id` that
    /// produced it, so verifiers know which verifying key to use.
    pub fn sign(&self, data: &[u8]) -> Result<(String, String), ApiError> {
        let key_id = self.active_key_id.as_ref().ok_or_else(|| ApiError::CryptoError {
            message: "no active signing key configured".to_string(),
        })?;
        let signing_key = &self.signing_keys[key_id];
        let signature: Signature = signing_key.sign(data);

        Ok((URL_SAFE_NO_PAD.encode(signature.to_bytes()), key_id.clone()))
    }

    /// Verifies `signature` (base64url) over `data` using the verifying key
    /// registered under `key_id`.
    pub fn verify(&self, data: &[u8], signature: &str, key_id: &str) -> Result<bool, ApiError> {
        let verifying_key = self
            .verifying_keys
            .get(key_id)
            .ok_or_else(|| ApiError::CryptoError {
                message: format!("unknown signing key id: {key_id}"),
            })?;

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ApiError::CryptoError {
                message: "malformed base64 signature".to_string(),
            })?;
        let sig_bytes: [u8; 64] = sig_bytes.try_into().map_err(|_| ApiError::CryptoError {
            message: "signature must be 64 bytes".to_string(),
        })?;
        let signature = Signature::from_bytes(&sig_bytes);

        Ok(verifying_key.verify(data, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ring() -> SignatureKeyRing {
        SignatureKeyRing::new().with_active_key(SigningKeyPair::generate("k1"))
    }

    #[test]
    fn test_sign_then_verify_succeeds() {
        let ring = test_ring();
        let data = b"verification:approved:identity=123";

        let (signature, key_id) = ring.sign(data).unwrap();
        assert_eq!(key_id, "k1");
        assert!(ring.verify(data, &signature, &key_id).unwrap());
    }

    #[test]
    fn test_tampered_data_fails_verification() {
        let ring = test_ring();
        let (signature, key_id) = ring.sign(b"original data").unwrap();

        assert!(!ring.verify(b"tampered data", &signature, &key_id).unwrap());
    }

    #[test]
    fn test_unknown_key_id_errors() {
        let ring = test_ring();
        let (signature, _) = ring.sign(b"data").unwrap();

        let result = ring.verify(b"data", &signature, "no-such-key");
        assert!(matches!(result, Err(ApiError::CryptoError { .. })));
    }

    #[test]
    fn test_retired_verifying_key_still_verifies() {
        let retired = SigningKeyPair::generate("k-old");
        let retired_verifying_key = retired.verifying_key();
        let signature_under_retired = {
            let ring = SignatureKeyRing::new().with_active_key(retired);
            ring.sign(b"old record").unwrap()
        };

        let ring = test_ring().with_verifying_key("k-old", retired_verifying_key);
        assert!(ring
            .verify(b"old record", &signature_under_retired.0, "k-old")
            .unwrap());
    }

    #[test]
    fn test_no_active_key_errors_on_sign() {
        let ring = SignatureKeyRing::new();
        let result = ring.sign(b"data");
        assert!(matches!(result, Err(ApiError::CryptoError { .. })));
    }
}
