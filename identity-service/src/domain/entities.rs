//! # Identity Domain Entities
//!
//! Maps to the `identities` and `sessions` tables (spec.md §3). `Identity`
//! is the aggregate root the rest of the workspace's crates reference only
//! by `identity_id` — this crate is the one place that owns its row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity lifecycle status (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "identity_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Active,
    Suspended,
    Deactivated,
    PendingVerification,
    PendingDeletion,
}

impl std::fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Suspended => "suspended",
            IdentityStatus::Deactivated => "deactivated",
            IdentityStatus::PendingVerification => "pending_verification",
            IdentityStatus::PendingDeletion => "pending_deletion",
        };
        write!(f, "{s}")
    }
}

/// The core account row (spec.md §3's `Identity` entity). `verification_badge`
/// mirrors verification-engine's `VerificationBadge` by name only — this
/// crate persists it as plain text rather than depending on that crate's
/// type, since the badge is write-through from a verification approval, not
/// validated here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub handle_id: Uuid,
    pub password_hash: String,
    pub status: IdentityStatus,
    pub verification_status: String,
    pub verification_badge: Option<String>,
    pub reputation_score: i32,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,
    pub mfa_enabled: bool,
    pub last_mfa_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }
}

/// Fields required to insert a freshly registered identity. `handle_id` is
/// already committed by the time this is built — registration inserts the
/// handle first, in the same transaction (spec.md §4.9).
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub phone: Option<String>,
    pub handle_id: Uuid,
    pub password_hash: String,
}

/// Public-facing summary returned from registration and profile lookups —
/// deliberately excludes `password_hash`, lockout internals, and
/// `failed_login_attempts`.
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub identity_id: Uuid,
    pub email: String,
    pub handle_id: Uuid,
    pub status: IdentityStatus,
    pub verification_badge: Option<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for IdentitySummary {
    fn from(identity: &Identity) -> Self {
        Self {
            identity_id: identity.identity_id,
            email: identity.email.clone(),
            handle_id: identity.handle_id,
            status: identity.status,
            verification_badge: identity.verification_badge.clone(),
            mfa_enabled: identity.mfa_enabled,
            created_at: identity.created_at,
        }
    }
}

/// A logged-in device/client (spec.md §3's `Session` entity). Token pairs
/// minted by `oauth-engine` carry this row's id as their opaque `sid` claim
/// but never reference it as a foreign key — sessions outlive any single
/// token pair and are revoked independently of token rotation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub identity_id: Uuid,
    pub client_id: String,
    pub device_descriptor: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub mfa_asserted: bool,
    pub mfa_asserted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub identity_id: Uuid,
    pub client_id: String,
    pub device_descriptor: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub mfa_asserted: bool,
}
