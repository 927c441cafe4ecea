//! Library surface for **identity-service** (spec.md §4.9 / C9).
//!
//! `main.rs` is a thin binary over this crate: it loads configuration,
//! bootstraps the engine services, and serves [`AppState`] behind the
//! route table in [`api::routes`]. Exposing this as a library lets the
//! integration suite under `tests/` build the same `AppState` against a
//! real Postgres/Redis without duplicating the wiring in `main.rs`.

pub mod api;
pub mod domain;
pub mod repository;
pub mod service;

use handle_engine::HandleService;
use mfa_engine::MfaService;
use oauth_engine::OAuthService;
use shared::auth::jwt::JwtService;
use std::sync::Arc;
use verification_engine::VerificationService;

use service::IdentityService;

/// Shared application state injected into all request handlers.
///
/// Every field is a composed engine service (or the `JwtService` shared
/// with `oauth_engine`); handlers never touch a repository directly.
pub struct AppState {
    pub identity_service: IdentityService,
    pub oauth_service: OAuthService,
    pub jwt_service: Arc<JwtService>,
    pub handle_service: HandleService,
    pub mfa_service: MfaService,
    pub verification_service: VerificationService,
}
