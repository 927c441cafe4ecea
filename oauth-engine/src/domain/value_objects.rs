//! # OAuth2 Value Objects
//!
//! Code/token generation and hashing, PKCE verification, and scope
//! intersection (spec.md §4.6). The generate-then-hash idiom mirrors
//! `eid_crypto`/`handle-engine`'s transfer tokens and `mfa-engine`'s
//! challenge codes: a 256-bit random value is returned to the caller once,
//! only its SHA-256/base64url hash is ever persisted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::entities::ChallengeMethod;

/// Generates a 256-bit URL-safe random string: authorization codes and
/// refresh tokens are both this shape (spec.md §4.6).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256(value), base64url-no-pad encoded — the only form ever stored.
pub fn hash_token(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verifies a PKCE code verifier against the stored challenge
/// (spec.md §4.6 "Token exchange"): `S256` requires
/// `BASE64URL(SHA-256(verifier)) == stored_challenge`; `plain` is a literal
/// compare. Both paths are constant-time.
pub fn verify_pkce(method: ChallengeMethod, verifier: &str, stored_challenge: &str) -> bool {
    match method {
        ChallengeMethod::S256 => {
            let mut hasher = Sha256::new();
            hasher.update(verifier.as_bytes());
            let computed = URL_SAFE_NO_PAD.encode(hasher.finalize());
            constant_time_str_eq(&computed, stored_challenge)
        }
        ChallengeMethod::Plain => constant_time_str_eq(verifier, stored_challenge),
    }
}

/// Intersects requested scopes with a client's allowed scopes and the set of
/// scopes the authority actually knows about (spec.md §4.6: "intersect
/// requested scopes with `client.allowed_scopes ∩ known_scopes`").
pub fn intersect_scopes(requested: &[String], client_allowed: &[String], known: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|s| client_allowed.iter().any(|a| a == *s) && known.iter().any(|k| k == *s))
        .cloned()
        .collect()
}

/// Parses a space-delimited `scope` string into its components.
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Joins scope components back into the space-delimited wire form.
pub fn join_scope(scopes: &[String]) -> String {
    scopes.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_url_safe_256_bit() {
        let token = generate_token();
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
        assert_eq!(URL_SAFE_NO_PAD.decode(&token).unwrap().len(), 32);
    }

    #[test]
    fn test_hash_token_deterministic() {
        let token = generate_token();
        assert_eq!(hash_token(&token), hash_token(&token));
    }

    #[test]
    fn test_hash_token_differs_for_different_inputs() {
        assert_ne!(hash_token(&generate_token()), hash_token(&generate_token()));
    }

    #[test]
    fn test_verify_pkce_s256() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        assert!(verify_pkce(ChallengeMethod::S256, verifier, &challenge));
        assert!(!verify_pkce(ChallengeMethod::S256, "wrong-verifier", &challenge));
    }

    #[test]
    fn test_verify_pkce_plain() {
        assert!(verify_pkce(ChallengeMethod::Plain, "abc123", "abc123"));
        assert!(!verify_pkce(ChallengeMethod::Plain, "abc123", "abc124"));
    }

    #[test]
    fn test_intersect_scopes() {
        let requested = vec!["profile".to_string(), "admin".to_string(), "email".to_string()];
        let allowed = vec!["profile".to_string(), "email".to_string()];
        let known = vec!["profile".to_string(), "email".to_string(), "admin".to_string()];

        let result = intersect_scopes(&requested, &allowed, &known);
        assert_eq!(result, vec!["profile".to_string(), "email".to_string()]);
    }

    #[test]
    fn test_scope_round_trip() {
        let scopes = vec!["profile".to_string(), "email".to_string()];
        assert_eq!(parse_scope(&join_scope(&scopes)), scopes);
    }
}
