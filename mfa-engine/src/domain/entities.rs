//! # MFA Domain Entities
//!
//! Maps to the `mfa_methods`, `mfa_challenges`, and `backup_codes` tables
//! (spec.md §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// MFA method kind. WebAuthn-shaped hardware keys and biometric template
/// binding are modeled but their enrollment ceremonies are out of scope
/// (spec.md's Non-goals exclude protocol invention, not these type slots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mfa_method_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MfaMethodType {
    Totp,
    Sms,
    Email,
    BackupCodes,
    HardwareKey,
    Biometric,
}

impl std::fmt::Display for MfaMethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MfaMethodType::Totp => "totp",
            MfaMethodType::Sms => "sms",
            MfaMethodType::Email => "email",
            MfaMethodType::BackupCodes => "backup_codes",
            MfaMethodType::HardwareKey => "hardware_key",
            MfaMethodType::Biometric => "biometric",
        };
        write!(f, "{s}")
    }
}

/// An enrolled (or enrolling) MFA method.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MfaMethod {
    pub method_id: Uuid,
    pub identity_id: Uuid,
    pub method_type: MfaMethodType,
    /// Contact address (phone/email) or TOTP account label. Displayed only
    /// through [`crate::domain::mask_identifier`], never shown raw.
    pub identifier: String,
    /// Envelope-encrypted TOTP secret (spec.md §4.1's envelope scheme).
    /// `None` for methods that don't carry a long-lived secret.
    pub secret_ciphertext: Option<String>,
    pub is_primary: bool,
    pub is_verified: bool,
    pub priority: i16,
    pub trust_level: i16,
    pub failed_counter: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MfaMethod {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Why a challenge was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mfa_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    Login,
    PasswordChange,
    SensitiveOp,
    /// Confirms a newly enrolled SMS/email contact method before it's
    /// usable for future challenges. Not one of spec.md's named purposes
    /// but covered by its `{..., …}` — enrolment needs the same single-use,
    /// expiring-code mechanics as any other challenge.
    EnrollmentVerification,
}

/// Challenge lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mfa_challenge_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Consumed,
    Expired,
    Failed,
}

/// A single-use challenge issued against one method (spec.md §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MfaChallenge {
    pub challenge_id: Uuid,
    pub identity_id: Uuid,
    pub method_id: Uuid,
    pub purpose: ChallengePurpose,
    /// Base64url(SHA-256(code)) for SMS/email; `None` for TOTP, which is
    /// verified against the live secret rather than a stored code.
    pub code_hash: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub status: ChallengeStatus,
}

/// One hashed, single-use backup code row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BackupCode {
    pub backup_code_id: Uuid,
    pub method_id: Uuid,
    pub code_hash: String,
    pub used_at: Option<DateTime<Utc>>,
}
