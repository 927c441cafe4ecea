//! # Crypto Primitives (C1)
//!
//! Password hashing, envelope encryption, and signing for every other
//! component crate. Nothing here talks to Postgres or Redis directly —
//! callers own persistence of ciphertext/signatures; this crate only turns
//! plaintext into ciphertext and back (spec.md §4.1).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`password`] | Re-exports `shared::auth::password` so callers don't need two crates for credential handling |
//! | [`envelope`] | AES-256-GCM envelope encryption with key rotation via `version` |
//! | [`signing`] | Ed25519 signatures for non-repudiable records (audit entries, verification decisions) |
//! | [`random`] | CSPRNG byte generation |
//!
//! ## Error Handling
//!
//! Every failure mode (KDF mismatch, AEAD tag failure, unknown key id)
//! surfaces as `ApiError::CryptoError`, never the underlying library error —
//! `aes-gcm`/`ed25519-dalek` error types don't implement `std::error::Error`
//! usefully for API responses and must never leak key material.

pub mod envelope;
pub mod random;
pub mod signing;

pub use shared::auth::password::{PasswordHasher, PasswordValidator};

pub use envelope::{EncryptedPayload, EnvelopeCipher, KeyRing};
pub use random::random_bytes;
pub use signing::{SignatureKeyRing, SigningKeyPair};
