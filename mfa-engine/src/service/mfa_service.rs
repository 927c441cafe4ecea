//! # MFA Service
//!
//! Enrolment, the challenge/verify state machine, lockout, and the policy
//! gate (spec.md §4.5).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use eid_crypto::{EncryptedPayload, EnvelopeCipher};
use shared::errors::ApiError;

use crate::domain::{
    constant_time_str_eq, generate_backup_code, generate_numeric_code, generate_totp_secret,
    mask_identifier, totp_uri, verify_totp, ChallengePurpose, MfaChallenge, MfaMethod,
    MfaMethodType,
};
use crate::repository::MfaRepository;

/// Default method priority assigned at enrolment (lower sorts first; the
/// caller can re-prioritize by re-enrolling / promoting a method later).
const DEFAULT_PRIORITY: i16 = 10;

/// Which purposes require MFA, the minimum method trust level accepted,
/// and which method types satisfy the gate (spec.md §4.5's "MFA policy").
#[derive(Debug, Clone)]
pub struct MfaPolicy {
    pub purposes_requiring_mfa: Vec<ChallengePurpose>,
    pub min_trust_level: i16,
    pub allowed_method_types: Vec<MfaMethodType>,
}

impl Default for MfaPolicy {
    fn default() -> Self {
        Self {
            purposes_requiring_mfa: vec![ChallengePurpose::Login, ChallengePurpose::SensitiveOp],
            min_trust_level: 1,
            allowed_method_types: vec![
                MfaMethodType::Totp,
                MfaMethodType::Sms,
                MfaMethodType::Email,
                MfaMethodType::BackupCodes,
            ],
        }
    }
}

/// Outcome of [`MfaService::require`]. `ChallengeRequired` carries the
/// plaintext SMS/email code (`None` for TOTP/backup codes) so the caller
/// can dispatch it through the appropriate notification channel — this
/// crate never dispatches notifications itself.
#[derive(Debug)]
pub enum MfaDecision {
    Satisfied,
    ChallengeRequired {
        challenge: MfaChallenge,
        method_hint: String,
        plaintext_code: Option<String>,
    },
}

/// Result of TOTP enrolment: the unverified method plus everything the
/// caller displays to the user (spec.md §4.5).
pub struct TotpEnrollment {
    pub method: MfaMethod,
    pub secret_base32: String,
    pub otpauth_url: String,
}

/// Result of backup code enrolment: the codes are only ever returned here,
/// never again (spec.md §4.5: "reveal plaintext once").
pub struct BackupCodeEnrollment {
    pub method: MfaMethod,
    pub codes: Vec<String>,
}

pub struct MfaService {
    repository: MfaRepository,
    crypto: EnvelopeCipher,
    policy: MfaPolicy,
    challenge_ttl: ChronoDuration,
    code_ttl: ChronoDuration,
    max_attempts: i32,
    max_failed: i32,
    cooldown: ChronoDuration,
    backup_code_count: usize,
    freshness_window: ChronoDuration,
    totp_step_seconds: u64,
}

impl MfaService {
    pub fn new(repository: MfaRepository, crypto: EnvelopeCipher) -> Self {
        Self {
            repository,
            crypto,
            policy: MfaPolicy::default(),
            challenge_ttl: ChronoDuration::minutes(5),
            code_ttl: ChronoDuration::minutes(10),
            max_attempts: 5,
            max_failed: 5,
            cooldown: ChronoDuration::minutes(15),
            backup_code_count: 10,
            freshness_window: ChronoDuration::minutes(10),
            totp_step_seconds: 30,
        }
    }

    pub fn with_policy(mut self, policy: MfaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_lockout(mut self, max_failed: i32, cooldown: ChronoDuration) -> Self {
        self.max_failed = max_failed;
        self.cooldown = cooldown;
        self
    }

    // -- Enrolment ---------------------------------------------------------

    /// Generates a TOTP secret, persists it envelope-encrypted, and returns
    /// the Base32 form plus an `otpauth://` URL for the enrolling client.
    /// The method is left unverified until [`MfaService::confirm_totp_enrollment`]
    /// succeeds.
    #[instrument(skip(self))]
    pub async fn enroll_totp(&self, identity_id: Uuid, issuer: &str, account_label: &str) -> Result<TotpEnrollment, ApiError> {
        let secret = generate_totp_secret();
        let associated_data = identity_id.to_string();
        let payload = self.crypto.encrypt(&secret, Some(associated_data.as_bytes()))?;
        let ciphertext = serde_json::to_string(&payload).map_err(|e| ApiError::CryptoError {
            message: format!("failed to serialize totp ciphertext: {e}"),
        })?;

        let method = self
            .repository
            .insert_method(identity_id, MfaMethodType::Totp, account_label, Some(&ciphertext), DEFAULT_PRIORITY)
            .await?;

        Ok(TotpEnrollment {
            otpauth_url: totp_uri(issuer, account_label, &secret, self.totp_step_seconds),
            secret_base32: crate::domain::encode_totp_secret(&secret),
            method,
        })
    }

    /// Verifies a TOTP code against the just-enrolled (still unverified)
    /// method's secret and, on success, marks it verified.
    #[instrument(skip(self, code))]
    pub async fn confirm_totp_enrollment(&self, method_id: Uuid, code: &str) -> Result<MfaMethod, ApiError> {
        let method = self
            .repository
            .find_method(method_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("mfa_method:{method_id}"),
            })?;

        let secret = self.decrypt_totp_secret(&method)?;
        let now = Utc::now().timestamp().max(0) as u64;
        if !verify_totp(&secret, code, self.totp_step_seconds, now) {
            return Err(ApiError::MfaFailed);
        }

        self.repository.mark_verified(method_id).await
    }

    /// Enrolls an SMS or email contact method (unverified) and immediately
    /// issues the enrolment-confirmation challenge carrying the one-time
    /// code to that contact (spec.md §4.5).
    #[instrument(skip(self))]
    pub async fn enroll_contact_method(
        &self,
        identity_id: Uuid,
        method_type: MfaMethodType,
        identifier: &str,
    ) -> Result<(MfaMethod, MfaChallenge, String), ApiError> {
        debug_assert!(matches!(method_type, MfaMethodType::Sms | MfaMethodType::Email));

        let method = self
            .repository
            .insert_method(identity_id, method_type, identifier, None, DEFAULT_PRIORITY)
            .await?;

        let code = generate_numeric_code();
        let code_hash = hash_code(&code);
        let challenge = self
            .repository
            .insert_challenge(
                identity_id,
                method.method_id,
                ChallengePurpose::EnrollmentVerification,
                Some(&code_hash),
                Utc::now() + self.code_ttl,
                self.max_attempts,
            )
            .await?;

        Ok((method, challenge, code))
    }

    /// Verifies the enrolment challenge and marks the contact method
    /// verified on success.
    #[instrument(skip(self, code))]
    pub async fn confirm_contact_enrollment(&self, challenge_id: Uuid, code: &str) -> Result<MfaMethod, ApiError> {
        let challenge = self.verify_challenge(challenge_id, code).await?;
        self.repository.mark_verified(challenge.method_id).await
    }

    /// Generates `n` backup codes (default from config), stores each as an
    /// individually hashed row, and returns the plaintext codes once.
    #[instrument(skip(self))]
    pub async fn enroll_backup_codes(&self, identity_id: Uuid) -> Result<BackupCodeEnrollment, ApiError> {
        let method = self
            .repository
            .insert_method(identity_id, MfaMethodType::BackupCodes, "backup codes", None, DEFAULT_PRIORITY + 100)
            .await?;

        let codes: Vec<String> = (0..self.backup_code_count).map(|_| generate_backup_code()).collect();
        let hashes: Vec<String> = codes.iter().map(|c| hash_code(c)).collect();
        self.repository.insert_backup_codes(method.method_id, &hashes).await?;

        let verified = self.repository.mark_verified(method.method_id).await?;
        info!(method_id = %verified.method_id, count = codes.len(), "backup codes enrolled");

        Ok(BackupCodeEnrollment { method: verified, codes })
    }

    // -- Challenge / verify --------------------------------------------------

    /// Issues a fresh challenge against `method_id`, refusing if the method
    /// is currently locked out. Returns the challenge, a masked method hint
    /// for display, and — for SMS/email — the plaintext code the caller
    /// must dispatch to that contact address (never persisted in the
    /// clear; only its hash is stored).
    #[instrument(skip(self))]
    pub async fn issue_challenge(
        &self,
        identity_id: Uuid,
        method_id: Uuid,
        purpose: ChallengePurpose,
    ) -> Result<(MfaChallenge, String, Option<String>), ApiError> {
        let method = self
            .repository
            .find_method(method_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("mfa_method:{method_id}"),
            })?;

        if method.is_locked(Utc::now()) {
            warn!(method_id = %method_id, "mfa method is locked out");
            return Err(ApiError::AccountInactive);
        }

        let (code_hash, plaintext_code, expires_at) = match method.method_type {
            MfaMethodType::Totp | MfaMethodType::BackupCodes => (None, None, Utc::now() + self.challenge_ttl),
            MfaMethodType::Sms | MfaMethodType::Email => {
                let code = generate_numeric_code();
                (Some(hash_code(&code)), Some(code), Utc::now() + self.code_ttl)
            }
            MfaMethodType::HardwareKey | MfaMethodType::Biometric => {
                return Err(ApiError::InvalidArgument {
                    message: "method type does not use a code-based challenge".to_string(),
                });
            }
        };

        let challenge = self
            .repository
            .insert_challenge(identity_id, method_id, purpose, code_hash.as_deref(), expires_at, self.max_attempts)
            .await?;

        Ok((challenge, mask_identifier(&method.identifier), plaintext_code))
    }

    /// Verifies a submitted code against a pending challenge, enforcing
    /// spec.md §4.5's consume rules: `attempts < max_attempts`, `status =
    /// pending`, `now < expires_at`, and a matching code. On success the
    /// challenge becomes `consumed`; on failure `attempts` increments and,
    /// at `max_attempts`, the challenge becomes `failed` and the method's
    /// `failed_counter` increments (triggering lockout at `max_failed`).
    #[instrument(skip(self, code))]
    pub async fn verify_challenge(&self, challenge_id: Uuid, code: &str) -> Result<MfaChallenge, ApiError> {
        let challenge = self
            .repository
            .find_challenge(challenge_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("mfa_challenge:{challenge_id}"),
            })?;

        if challenge.status != crate::domain::ChallengeStatus::Pending {
            return Err(ApiError::MfaFailed);
        }
        if challenge.attempts >= challenge.max_attempts {
            return Err(ApiError::MfaFailed);
        }
        if challenge.expires_at <= Utc::now() {
            self.repository.mark_expired(challenge_id).await?;
            return Err(ApiError::MfaFailed);
        }

        let method = self
            .repository
            .find_method(challenge.method_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("mfa_method:{}", challenge.method_id),
            })?;

        let matched = self.code_matches(&method, &challenge, code).await?;

        if !matched {
            self.repository.record_attempt_failure(challenge_id).await?;
            self.repository
                .register_failure(method.method_id, self.max_failed, self.cooldown)
                .await?;
            return Err(ApiError::MfaFailed);
        }

        let consumed = self.repository.mark_consumed(challenge_id).await?;
        self.repository.reset_failures(method.method_id).await?;
        Ok(consumed)
    }

    async fn code_matches(&self, method: &MfaMethod, challenge: &MfaChallenge, code: &str) -> Result<bool, ApiError> {
        match method.method_type {
            MfaMethodType::Totp => {
                let secret = self.decrypt_totp_secret(method)?;
                let now = Utc::now().timestamp().max(0) as u64;
                Ok(verify_totp(&secret, code, self.totp_step_seconds, now))
            }
            MfaMethodType::Sms | MfaMethodType::Email => {
                let expected_hash = challenge.code_hash.as_deref().unwrap_or_default();
                Ok(constant_time_str_eq(&hash_code(code), expected_hash))
            }
            MfaMethodType::BackupCodes => {
                let candidates = self.repository.find_unused_backup_codes(method.method_id).await?;
                let submitted_hash = hash_code(code);
                for candidate in candidates {
                    if constant_time_str_eq(&candidate.code_hash, &submitted_hash) {
                        return self.repository.mark_backup_code_used(candidate.backup_code_id).await;
                    }
                }
                Ok(false)
            }
            MfaMethodType::HardwareKey | MfaMethodType::Biometric => Ok(false),
        }
    }

    fn decrypt_totp_secret(&self, method: &MfaMethod) -> Result<Vec<u8>, ApiError> {
        let ciphertext = method.secret_ciphertext.as_deref().ok_or_else(|| ApiError::InvalidArgument {
            message: "method has no totp secret".to_string(),
        })?;
        let payload: EncryptedPayload = serde_json::from_str(ciphertext).map_err(|e| ApiError::CryptoError {
            message: format!("failed to deserialize totp ciphertext: {e}"),
        })?;
        let associated_data = method.identity_id.to_string();
        self.crypto.decrypt(&payload, Some(associated_data.as_bytes()))
    }

    // -- Policy gate ----------------------------------------------------------

    /// Consults the MFA policy and either reports the session already
    /// satisfies it (`last_mfa_at` within the freshness window) or issues a
    /// challenge against the identity's best-priority eligible method
    /// (spec.md §4.5).
    #[instrument(skip(self))]
    pub async fn require(
        &self,
        identity_id: Uuid,
        purpose: ChallengePurpose,
        last_mfa_at: Option<DateTime<Utc>>,
    ) -> Result<MfaDecision, ApiError> {
        if !self.policy.purposes_requiring_mfa.contains(&purpose) {
            return Ok(MfaDecision::Satisfied);
        }

        if let Some(last) = last_mfa_at {
            if Utc::now() - last <= self.freshness_window {
                return Ok(MfaDecision::Satisfied);
            }
        }

        let methods = self.repository.list_methods(identity_id).await?;
        let eligible = methods.into_iter().find(|m| {
            m.is_verified
                && !m.is_locked(Utc::now())
                && m.trust_level >= self.policy.min_trust_level
                && self.policy.allowed_method_types.contains(&m.method_type)
        });

        let method = eligible.ok_or(ApiError::MfaRequired { challenge_id: None })?;
        let (challenge, method_hint, plaintext_code) =
            self.issue_challenge(identity_id, method.method_id, purpose).await?;
        Ok(MfaDecision::ChallengeRequired { challenge, method_hint, plaintext_code })
    }
}

/// Same base64url(SHA-256(code)) idiom used throughout the workspace for
/// hashing single-use secrets at rest.
fn hash_code(code: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    let digest = Sha256::digest(code.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_code_is_deterministic() {
        assert_eq!(hash_code("123456"), hash_code("123456"));
        assert_ne!(hash_code("123456"), hash_code("654321"));
    }

    #[test]
    fn test_default_policy_requires_mfa_for_login_and_sensitive_op() {
        let policy = MfaPolicy::default();
        assert!(policy.purposes_requiring_mfa.contains(&ChallengePurpose::Login));
        assert!(policy.purposes_requiring_mfa.contains(&ChallengePurpose::SensitiveOp));
        assert!(!policy.purposes_requiring_mfa.contains(&ChallengePurpose::EnrollmentVerification));
    }
}
