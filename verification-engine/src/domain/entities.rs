//! # Verification Domain Entities
//!
//! Maps to the `verification_requests`, `verification_documents`, and
//! `verification_request_documents` tables (spec.md §3, §4.7).
//! `VerificationRequest` is the aggregate root; documents are independent,
//! content-addressed rows a request merely references, so the same upload
//! can back more than one request without being stored twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What is being verified, driving the badge granted on approval
/// (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_request_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Celebrity,
    Business,
    Government,
    Standard,
}

/// Badge granted to an identity on request approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_badge", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VerificationBadge {
    Gold,
    Business,
    Government,
    Blue,
}

impl RequestType {
    /// celebrity → gold, business → business, government → government,
    /// else → blue (spec.md §4.7).
    pub fn badge(&self) -> VerificationBadge {
        match self {
            RequestType::Celebrity => VerificationBadge::Gold,
            RequestType::Business => VerificationBadge::Business,
            RequestType::Government => VerificationBadge::Government,
            RequestType::Standard => VerificationBadge::Blue,
        }
    }
}

impl std::fmt::Display for VerificationBadge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationBadge::Gold => write!(f, "gold"),
            VerificationBadge::Business => write!(f, "business"),
            VerificationBadge::Government => write!(f, "government"),
            VerificationBadge::Blue => write!(f, "blue"),
        }
    }
}

/// Request lifecycle status (spec.md §4.7's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    NeedsInfo,
}

/// A verification request — at most one reviewer holds it at a time via
/// `assigned_reviewer`; `version` guards concurrent reviewer actions
/// (spec.md §4.3's optimistic-concurrency convention).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationRequest {
    pub request_id: Uuid,
    pub identity_id: Uuid,
    pub request_type: RequestType,
    /// `1..5`, lower sorts first. Derived from protected-handle tier for
    /// claim-driven requests (spec.md §4.4), or a default for self-filed
    /// verification requests.
    pub priority: i16,
    pub status: RequestStatus,
    pub assigned_reviewer: Option<Uuid>,
    pub rejection_reason: Option<String>,
    /// Ed25519 signature over the decision (spec.md §4.1's `sign` operation;
    /// see `eid_crypto::signing`), set once the request leaves
    /// `under_review`. Makes `approved`/`rejected` decisions non-repudiable.
    pub decision_signature: Option<String>,
    pub decision_signing_key_id: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to submit a new request.
#[derive(Debug, Clone)]
pub struct NewVerificationRequest {
    pub identity_id: Uuid,
    pub request_type: RequestType,
    pub priority: i16,
}

/// A content-addressed document. `sha256_hash` is the content address: a
/// second submission of identical bytes resolves to the existing row
/// instead of inserting a duplicate (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub document_id: Uuid,
    pub sha256_hash: String,
    pub document_type: String,
    pub blob_url: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to register a document (the caller has already
/// uploaded the blob and computed/knows its hash and size).
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub sha256_hash: String,
    pub document_type: String,
    pub blob_url: String,
    pub size_bytes: i64,
    pub mime_type: String,
}
