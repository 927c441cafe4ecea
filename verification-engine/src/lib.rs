//! # Verification Pipeline (C7)
//!
//! Document intake, the `submitted → under_review → {approved, rejected,
//! needs_info → submitted}` request state machine, reviewer queue, and
//! badge assignment (spec.md §4.7).
//!
//! Documents are content-addressed by SHA-256 and shared across requests;
//! review decisions are Ed25519-signed via [`eid_crypto::signing`] so an
//! approval or rejection cannot later be repudiated. This crate writes the
//! granted badge straight to the `identities` table in the same transaction
//! as the request's approval — the one place in this workspace a component
//! crate reaches outside the tables it otherwise owns, because spec.md
//! §4.7 requires the two updates to be atomic.

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{
    content_hash, Document, NewDocument, NewVerificationRequest, RequestStatus, RequestType,
    VerificationBadge, VerificationRequest,
};
pub use repository::VerificationRepository;
pub use service::{DocumentUpload, VerificationService, DEFAULT_PRIORITY};
