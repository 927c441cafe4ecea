//! # Validation Result Types
//!
//! The outcome shape shared by `check` and `claim` (spec.md §6's
//! `GET /handles/check` response and §4.4's failure taxonomy).

use serde::{Deserialize, Serialize};

use super::entities::ProtectionTier;

/// System-reserved substrings rejected by content moderation (spec.md §4.4
/// step 5). Matched case-insensitively as a substring, not an exact match,
/// so `admin2026` and `theadmin` are both caught.
pub const DISALLOWED_SUBSTRINGS: &[&str] = &[
    "admin", "root", "support", "system", "moderator", "staff", "official",
    "security", "help", "billing",
];

/// Why a candidate handle failed validation (spec.md §4.4's failure
/// taxonomy, minus the two transfer-only variants which never come out of
/// `check`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HandleRejection {
    InvalidFormat,
    Taken,
    Reserved { reservation_class: String },
    SimilarToProtected {
        entity_name: String,
        score: f64,
        tier: ProtectionTier,
    },
    Inappropriate,
}

impl HandleRejection {
    pub fn error_code(&self) -> &'static str {
        match self {
            HandleRejection::InvalidFormat => "invalid_format",
            HandleRejection::Taken => "taken",
            HandleRejection::Reserved { .. } => "reserved",
            HandleRejection::SimilarToProtected { .. } => "similar_to_protected",
            HandleRejection::Inappropriate => "inappropriate",
        }
    }
}

/// Result of running the six-step validation pipeline against a candidate
/// handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleCheckResult {
    pub handle: String,
    pub available: bool,
    pub rejection: Option<HandleRejection>,
    /// Populated only when `rejection` is `SimilarToProtected`.
    pub similar_entity: Option<String>,
    pub protected_similarity: Option<f64>,
    /// Up to five available suggestions, populated only when `available`.
    pub suggestions: Vec<String>,
}

impl HandleCheckResult {
    pub fn available(handle: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            handle: handle.into(),
            available: true,
            rejection: None,
            similar_entity: None,
            protected_similarity: None,
            suggestions,
        }
    }

    pub fn rejected(handle: impl Into<String>, rejection: HandleRejection) -> Self {
        let (similar_entity, protected_similarity) = match &rejection {
            HandleRejection::SimilarToProtected { entity_name, score, .. } => {
                (Some(entity_name.clone()), Some(*score))
            }
            _ => (None, None),
        };
        Self {
            handle: handle.into(),
            available: false,
            rejection: Some(rejection),
            similar_entity,
            protected_similarity,
            suggestions: Vec::new(),
        }
    }
}
