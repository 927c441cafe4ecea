//! # Handle Engine (C4)
//!
//! Handle allocation and anti-impersonation: format validation, the
//! six-step validation pipeline, deterministic suggestions, the claim
//! workflow, and the two-phase transfer protocol (spec.md §4.4).
//!
//! This crate owns handle uniqueness and protection decisions; it does not
//! talk to identities or profiles directly. The identity façade (C9)
//! composes [`service::HandleService::register`] — or the lower-level
//! [`repository::HandleRepository::insert_active`], which accepts any
//! `PgExecutor` — into its own registration transaction.

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{
    Handle, HandleCheckResult, HandleId, HandleRejection, HandleStatus, HandleTransfer,
    NewHandle, ProtectedEntry, ProtectionTier, ReservedHandle,
};
pub use repository::HandleRepository;
pub use service::{ClaimOutcome, HandleService, TransferInitiation};
