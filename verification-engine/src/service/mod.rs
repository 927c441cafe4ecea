mod verification_service;

pub use verification_service::{DocumentUpload, VerificationService, DEFAULT_PRIORITY};
