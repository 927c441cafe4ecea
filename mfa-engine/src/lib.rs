//! # MFA Engine (C5)
//!
//! Multi-factor enrolment, the challenge/verify state machine, lockout, and
//! the policy gate (spec.md §4.5).
//!
//! This crate owns MFA method and challenge state only; it does not know
//! about identities, sessions, or login flows. The identity façade (C9)
//! calls [`service::MfaService::require`] during login/sensitive
//! operations and surfaces `ApiError::MfaRequired`/`MfaFailed` to the
//! client per spec.md §7.

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{
    constant_time_str_eq, mask_identifier, verify_totp, BackupCode, ChallengePurpose,
    ChallengeStatus, MfaChallenge, MfaMethod, MfaMethodType,
};
pub use repository::MfaRepository;
pub use service::{BackupCodeEnrollment, MfaDecision, MfaPolicy, MfaService, TotpEnrollment};
