mod mfa_repository;

pub use mfa_repository::MfaRepository;
