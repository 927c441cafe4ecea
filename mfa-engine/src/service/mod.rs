mod mfa_service;

pub use mfa_service::{BackupCodeEnrollment, MfaDecision, MfaPolicy, MfaService, TotpEnrollment};
