//! # Verification Domain
//!
//! Entities and value objects for the verification pipeline (spec.md §4.7).

mod entities;
mod value_objects;

pub use entities::{
    Document, NewDocument, NewVerificationRequest, RequestStatus, RequestType,
    VerificationBadge, VerificationRequest,
};
pub use value_objects::{content_hash, decision_payload};
