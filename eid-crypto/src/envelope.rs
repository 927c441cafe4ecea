//! # Envelope Encryption (AES-256-GCM)
//!
//! Implements spec.md §4.1's envelope scheme: a process-wide master key
//! wraps a fresh per-record data encryption key (DEK); the DEK is what
//! actually encrypts the plaintext. Rotating the master key means re-wrapping
//! stored DEKs under a new `version` without touching the ciphertext they
//! protect.
//!
//! ```text
//! plaintext ──AES-256-GCM(DEK)──► ciphertext
//!                 │
//!                 ▼
//!                DEK ──AES-256-GCM(master key)──► wrapped_dek
//! ```
//!
//! AES-GCM is used throughout with 96-bit (12-byte) IVs and 128-bit tags, as
//! spec.md requires. `aes-gcm`'s `Aead::encrypt` appends the tag to the
//! ciphertext, so `EncryptedPayload` doesn't track it separately.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use shared::errors::ApiError;
use std::collections::HashMap;

const NONCE_LEN: usize = 12;
const DEK_LEN: usize = 32;

/// A fully-wrapped ciphertext record, ready to persist.
///
/// Field names mirror spec.md's `encrypt` return tuple
/// `(ciphertext, key_id, iv, version)`, plus the `wrapped_dek`/`dek_iv` pair
/// needed to unwrap the DEK on decrypt — a literal 4-tuple can't carry the
/// wrapped key material without losing the ability to decrypt after master
/// key rotation, so we persist it alongside.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncryptedPayload {
    /// AES-256-GCM ciphertext of the plaintext, encrypted under the DEK.
    /// Base64url, tag appended by the AEAD implementation.
    pub ciphertext: String,
    /// IV used to encrypt the plaintext under the DEK. Base64url.
    pub iv: String,
    /// The DEK, encrypted under the master key identified by `key_id`.
    /// Base64url, tag appended.
    pub wrapped_dek: String,
    /// IV used to wrap the DEK under the master key. Base64url.
    pub dek_iv: String,
    /// Identifies which master key wrapped the DEK.
    pub key_id: String,
    /// Master key version at the time of wrapping — bumped on rotation.
    pub version: u32,
}

/// Holds the process's master keys, keyed by `key_id`.
///
/// Loaded once at startup from configuration/secret storage. Rotating a
/// master key means adding a new `key_id`/`version` entry here and
/// re-wrapping outstanding DEKs; old entries are kept until every record
/// wrapped under them has been re-wrapped.
#[derive(Clone)]
pub struct KeyRing {
    keys: HashMap<String, (u32, [u8; DEK_LEN])>,
    active_key_id: String,
}

impl KeyRing {
    /// Creates a key ring with a single active master key.
    ///
    /// `master_key` must be exactly 32 bytes (AES-256). Additional keys for
    /// rotation/decrypt-only use can be added with [`KeyRing::with_key`].
    pub fn new(key_id: impl Into<String>, version: u32, master_key: [u8; DEK_LEN]) -> Self {
        let key_id = key_id.into();
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), (version, master_key));
        Self {
            keys,
            active_key_id: key_id,
        }
    }

    /// Registers an additional (typically retired) master key, usable for
    /// decryption but never chosen as the active encryption key.
    pub fn with_key(mut self, key_id: impl Into<String>, version: u32, master_key: [u8; DEK_LEN]) -> Self {
        self.keys.insert(key_id.into(), (version, master_key));
        self
    }

    fn active(&self) -> (&str, u32, &[u8; DEK_LEN]) {
        let (version, key) = &self.keys[&self.active_key_id];
        (&self.active_key_id, *version, key)
    }

    fn lookup(&self, key_id: &str) -> Result<&[u8; DEK_LEN], ApiError> {
        self.keys
            .get(key_id)
            .map(|(_, key)| key)
            .ok_or_else(|| ApiError::CryptoError {
                message: format!("unknown key id: {key_id}"),
            })
    }
}

/// Encrypts and decrypts records under a [`KeyRing`].
#[derive(Clone)]
pub struct EnvelopeCipher {
    keys: KeyRing,
}

impl EnvelopeCipher {
    pub fn new(keys: KeyRing) -> Self {
        Self { keys }
    }

    /// Encrypts `plaintext` under a freshly generated DEK, itself wrapped by
    /// the key ring's active master key.
    ///
    /// `associated_data` is authenticated but not encrypted (AEAD AAD) —
    /// pass the record id or entity type so ciphertext can't be replayed
    /// onto a different record.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<EncryptedPayload, ApiError> {
        let (key_id, version, master_key) = self.keys.active();

        let mut dek = [0u8; DEK_LEN];
        OsRng.fill_bytes(&mut dek);

        let mut data_iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut data_iv);
        let data_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
        let ciphertext = data_cipher
            .encrypt(
                Nonce::from_slice(&data_iv),
                Payload {
                    msg: plaintext,
                    aad: associated_data.unwrap_or(&[]),
                },
            )
            .map_err(|_| ApiError::CryptoError {
                message: "AEAD encryption failed".to_string(),
            })?;

        let mut dek_iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut dek_iv);
        let wrap_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
        let wrapped_dek = wrap_cipher
            .encrypt(Nonce::from_slice(&dek_iv), dek.as_ref())
            .map_err(|_| ApiError::CryptoError {
                message: "DEK wrap failed".to_string(),
            })?;

        Ok(EncryptedPayload {
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
            iv: URL_SAFE_NO_PAD.encode(data_iv),
            wrapped_dek: URL_SAFE_NO_PAD.encode(wrapped_dek),
            dek_iv: URL_SAFE_NO_PAD.encode(dek_iv),
            key_id: key_id.to_string(),
            version,
        })
    }

    /// Reverses [`EnvelopeCipher::encrypt`]. Fails with `ApiError::CryptoError`
    /// on an unknown `key_id`, a corrupt/truncated field, or an AEAD tag
    /// mismatch (tampering or wrong associated data).
    pub fn decrypt(
        &self,
        payload: &EncryptedPayload,
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>, ApiError> {
        let master_key = self.keys.lookup(&payload.key_id)?;

        let wrapped_dek = decode_field(&payload.wrapped_dek)?;
        let dek_iv = decode_nonce(&payload.dek_iv)?;
        let wrap_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
        let dek = wrap_cipher
            .decrypt(Nonce::from_slice(&dek_iv), wrapped_dek.as_ref())
            .map_err(|_| ApiError::CryptoError {
                message: "DEK unwrap failed (tag mismatch or corrupt key)".to_string(),
            })?;

        let ciphertext = decode_field(&payload.ciphertext)?;
        let data_iv = decode_nonce(&payload.iv)?;
        let data_cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
        data_cipher
            .decrypt(
                Nonce::from_slice(&data_iv),
                Payload {
                    msg: &ciphertext,
                    aad: associated_data.unwrap_or(&[]),
                },
            )
            .map_err(|_| ApiError::CryptoError {
                message: "AEAD decryption failed (tag mismatch or corrupt ciphertext)".to_string(),
            })
    }
}

fn decode_field(b64: &str) -> Result<Vec<u8>, ApiError> {
    URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|_| ApiError::CryptoError {
            message: "malformed base64 field".to_string(),
        })
}

fn decode_nonce(b64: &str) -> Result<[u8; NONCE_LEN], ApiError> {
    let bytes = decode_field(b64)?;
    bytes.try_into().map_err(|_| ApiError::CryptoError {
        message: "IV must be 96 bits".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> EnvelopeCipher {
        EnvelopeCipher::new(KeyRing::new("k1", 1, [7u8; DEK_LEN]))
    }

    #[test]
    fn test_encrypt_then_decrypt_roundtrips() {
        let cipher = test_cipher();
        let plaintext = b"totp-secret-material";

        let payload = cipher.encrypt(plaintext, Some(b"mfa_method:123")).unwrap();
        let decrypted = cipher.decrypt(&payload, Some(b"mfa_method:123")).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(payload.key_id, "k1");
        assert_eq!(payload.version, 1);
    }

    #[test]
    fn test_wrong_associated_data_fails_decrypt() {
        let cipher = test_cipher();
        let payload = cipher.encrypt(b"secret", Some(b"record:1")).unwrap();

        let result = cipher.decrypt(&payload, Some(b"record:2"));
        assert!(matches!(result, Err(ApiError::CryptoError { .. })));
    }

    #[test]
    fn test_unknown_key_id_fails_decrypt() {
        let cipher = test_cipher();
        let mut payload = cipher.encrypt(b"secret", None).unwrap();
        payload.key_id = "no-such-key".to_string();

        let result = cipher.decrypt(&payload, None);
        assert!(matches!(result, Err(ApiError::CryptoError { .. })));
    }

    #[test]
    fn test_tampered_ciphertext_fails_decrypt() {
        let cipher = test_cipher();
        let mut payload = cipher.encrypt(b"secret", None).unwrap();
        payload.ciphertext = URL_SAFE_NO_PAD.encode(b"not the real ciphertext at all!!");

        let result = cipher.decrypt(&payload, None);
        assert!(matches!(result, Err(ApiError::CryptoError { .. })));
    }

    #[test]
    fn test_rotation_decrypts_under_retired_key() {
        let keys = KeyRing::new("k2", 2, [9u8; DEK_LEN]).with_key("k1", 1, [7u8; DEK_LEN]);
        let old_cipher = EnvelopeCipher::new(KeyRing::new("k1", 1, [7u8; DEK_LEN]));
        let payload = old_cipher.encrypt(b"secret", None).unwrap();

        let rotated_cipher = EnvelopeCipher::new(keys);
        let decrypted = rotated_cipher.decrypt(&payload, None).unwrap();
        assert_eq!(decrypted, b"secret");
    }

    #[test]
    fn test_each_encryption_uses_a_fresh_iv() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"same plaintext", None).unwrap();
        let b = cipher.encrypt(b"same plaintext", None).unwrap();

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
