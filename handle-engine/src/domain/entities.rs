//! # Handle Domain Entities
//!
//! Maps to the `handles`, `reserved_handles`, and `protected_entries` tables
//! (spec.md §3, §4.4). `Handle` is the aggregate root; reservation and
//! protection are read-mostly reference data consulted by the validation
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Handle lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "handle_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HandleStatus {
    Active,
    Reserved,
    Transferring,
    Suspended,
    Released,
}

impl std::fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleStatus::Active => write!(f, "active"),
            HandleStatus::Reserved => write!(f, "reserved"),
            HandleStatus::Transferring => write!(f, "transferring"),
            HandleStatus::Suspended => write!(f, "suspended"),
            HandleStatus::Released => write!(f, "released"),
        }
    }
}

/// A handle row — at most one `Active` row may exist per `handle_lower`
/// (spec.md §3's handle-uniqueness invariant).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Handle {
    pub handle_id: Uuid,
    pub handle: String,
    pub handle_lower: String,
    pub owner_identity_id: Uuid,
    pub status: HandleStatus,
    pub reservation_class: Option<String>,
    pub is_protected: bool,
    pub original_owner_id: Option<Uuid>,
    /// SHA-256 hash of the transfer token, never the token itself.
    pub transfer_token_hash: Option<String>,
    pub transfer_expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new, immediately-active handle.
#[derive(Debug, Clone)]
pub struct NewHandle {
    pub handle: String,
    pub handle_lower: String,
    pub owner_identity_id: Uuid,
}

/// A system reservation blocking `active` creation of a handle until
/// released (spec.md §4.4 step 3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReservedHandle {
    pub reserved_handle_id: Uuid,
    pub handle_lower: String,
    pub reservation_class: String,
    pub created_at: DateTime<Utc>,
}

/// Protection tier, driving both the similarity threshold default and
/// claim-request priority (spec.md §4.4's claim workflow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "protection_tier", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum ProtectionTier {
    UltraHigh,
    High,
    Medium,
}

impl ProtectionTier {
    /// Verification-request priority derived from tier: ultra-high → 1,
    /// high → 2, medium → 3 (spec.md §4.4).
    pub fn claim_priority(&self) -> i16 {
        match self {
            ProtectionTier::UltraHigh => 1,
            ProtectionTier::High => 2,
            ProtectionTier::Medium => 3,
        }
    }
}

/// A protected figure, brand, or trademark, guarded against look-alike
/// handles by similarity scoring (spec.md §4.4 step 4).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProtectedEntry {
    pub protected_entry_id: Uuid,
    pub name: String,
    /// The canonical handle this entry protects, already case-folded.
    pub handle_lower: String,
    /// Additional case-folded aliases considered during similarity scoring.
    pub aliases: Vec<String>,
    pub tier: ProtectionTier,
    /// `s ≥ threshold` triggers `similar_to_protected`. Default `0.85`,
    /// constrained to `[0.5, 1.0]` (spec.md §3's Handle invariant).
    pub similarity_threshold: f64,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ProtectedEntry {
    /// Every case-folded string this entry is matched against: the
    /// canonical handle plus all aliases.
    pub fn match_candidates(&self) -> Vec<&str> {
        std::iter::once(self.handle_lower.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect()
    }
}

/// An in-flight two-phase handle transfer (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HandleTransfer {
    pub transfer_id: Uuid,
    pub handle_id: Uuid,
    pub from_identity_id: Uuid,
    pub to_identity_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
