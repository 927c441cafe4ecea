//! # MFA Value Objects
//!
//! TOTP secret/URL helpers, masked-identifier formatting, and one-time-code
//! generation (spec.md §4.5).

use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use totp_lite::{totp_custom, Sha1};

/// 160 bits, the RFC 6238-recommended TOTP secret length (spec.md §4.5).
const TOTP_SECRET_LEN: usize = 20;

/// Generates a fresh TOTP secret (raw bytes, not yet encoded). Fills a
/// fixed-size array directly (same approach as `eid_crypto::envelope`'s DEK
/// generation) rather than going through `random_bytes`, which returns a
/// `Vec` and would need a fallible length conversion back to an array.
pub fn generate_totp_secret() -> [u8; TOTP_SECRET_LEN] {
    let mut secret = [0u8; TOTP_SECRET_LEN];
    OsRng.fill_bytes(&mut secret);
    secret
}

/// Base32-encodes a TOTP secret for display to the enrolling user.
pub fn encode_totp_secret(secret: &[u8]) -> String {
    BASE32_NOPAD.encode(secret)
}

/// Builds the `otpauth://totp/...` URL authenticator apps scan, per the
/// [Key Uri Format](https://github.com/google/google-authenticator/wiki/Key-Uri-Format).
pub fn totp_uri(issuer: &str, account: &str, secret: &[u8], step_seconds: u64) -> String {
    let encoded_secret = encode_totp_secret(secret);
    let label = format!("{issuer}:{account}");
    format!(
        "otpauth://totp/{}?secret={}&issuer={}&algorithm=SHA1&digits=6&period={}",
        urlencoding_path(&label),
        encoded_secret,
        urlencoding_path(issuer),
        step_seconds,
    )
}

/// Minimal percent-encoding for the label/issuer path segments — the only
/// characters an identity/handle/display-name can plausibly contain that
/// aren't URL-safe are `:` (already used as the label separator) and spaces.
fn urlencoding_path(s: &str) -> String {
    s.replace(' ', "%20").replace(':', "%3A")
}

/// Generates a 6-digit numeric one-time code for SMS/email delivery
/// (spec.md §4.5), zero-padded.
pub fn generate_numeric_code() -> String {
    let n = OsRng.next_u32() % 1_000_000;
    format!("{n:06}")
}

/// Generates a single backup code: 10 bytes of randomness, Base32-encoded
/// and hyphenated into two groups for readability (e.g. `ABCDE-FGHIJ`).
pub fn generate_backup_code() -> String {
    let mut bytes = [0u8; 10];
    OsRng.fill_bytes(&mut bytes);
    let encoded = BASE32_NOPAD.encode(&bytes);
    let (first, second) = encoded.split_at(encoded.len() / 2);
    format!("{first}-{second}")
}

/// Checks `code` against a TOTP secret, trying the current step and one
/// step on either side (spec.md §4.5: "TOTP window ±1 step") to absorb
/// clock skew between the server and the authenticator app.
pub fn verify_totp(secret: &[u8], code: &str, step_seconds: u64, now_unix: u64) -> bool {
    for offset in [-1i64, 0, 1] {
        let shifted = now_unix as i64 + offset * step_seconds as i64;
        if shifted < 0 {
            continue;
        }
        let expected = totp_custom::<Sha1>(step_seconds, 6, secret, shifted as u64);
        if constant_time_str_eq(&expected, code) {
            return true;
        }
    }
    false
}

/// Constant-time string comparison, used everywhere a user-submitted code
/// or hash is checked against a stored value (spec.md §4.5).
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Masks a phone number or email for display, keeping only enough to let
/// the owner recognize it (spec.md §4.5's "masked method hint").
pub fn mask_identifier(identifier: &str) -> String {
    if let Some(at) = identifier.find('@') {
        let (local, domain) = identifier.split_at(at);
        let visible = local.chars().next().map(|c| c.to_string()).unwrap_or_default();
        format!("{visible}***{domain}")
    } else {
        let visible_len = 4.min(identifier.len());
        let visible: String = identifier.chars().rev().take(visible_len).collect::<Vec<_>>().into_iter().rev().collect();
        format!("***{visible}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_totp_secret_is_160_bits() {
        let secret = generate_totp_secret();
        assert_eq!(secret.len(), 20);
    }

    #[test]
    fn test_totp_uri_contains_expected_fields() {
        let secret = [1u8; 20];
        let uri = totp_uri("Entativa ID", "user@example.com", &secret, 30);
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("algorithm=SHA1"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));
        assert!(uri.contains(&encode_totp_secret(&secret)));
    }

    #[test]
    fn test_generate_numeric_code_is_six_digits() {
        for _ in 0..20 {
            let code = generate_numeric_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_backup_code_is_hyphenated() {
        let code = generate_backup_code();
        assert!(code.contains('-'));
    }

    #[test]
    fn test_mask_identifier_email() {
        assert_eq!(mask_identifier("alice@example.com"), "a***@example.com");
    }

    #[test]
    fn test_verify_totp_accepts_current_and_adjacent_step() {
        let secret = b"12345678901234567890";
        let now = 1_700_000_000u64;
        let code_now = totp_custom::<Sha1>(30, 6, secret, now);
        let code_prev = totp_custom::<Sha1>(30, 6, secret, now - 30);

        assert!(verify_totp(secret, &code_now, 30, now));
        assert!(verify_totp(secret, &code_prev, 30, now));
    }

    #[test]
    fn test_verify_totp_rejects_wrong_code() {
        let secret = b"12345678901234567890";
        let now = 1_700_000_000u64;
        let code_now = totp_custom::<Sha1>(30, 6, secret, now);
        let wrong = if code_now == "000000" { "111111".to_string() } else { "000000".to_string() };
        assert!(!verify_totp(secret, &wrong, 30, now));
    }

    #[test]
    fn test_constant_time_str_eq() {
        assert!(constant_time_str_eq("abc123", "abc123"));
        assert!(!constant_time_str_eq("abc123", "abc124"));
        assert!(!constant_time_str_eq("abc123", "abc12"));
    }

    #[test]
    fn test_mask_identifier_phone() {
        let masked = mask_identifier("+15551234567");
        assert!(masked.ends_with("4567"));
        assert!(masked.starts_with("***"));
    }
}
