//! # Authentication and Authorization Module
//!
//! This module provides all authentication and authorization functionality
//! for the identity authority component crates.
//!
//! ## Module Structure
//!
//! ```text
//! auth/
//! ├── jwt.rs        - Access token generation and validation
//! ├── password.rs   - Secure password hashing with Argon2id
//! └── middleware.rs - Actix-web authentication middleware
//! ```
//!
//! ## Overview
//!
//! | Component | Purpose | See Also |
//! |-----------|---------|----------|
//! | [`JwtService`] | Generate and validate JWT access tokens | [RFC 7519](https://tools.ietf.org/html/rfc7519) |
//! | [`PasswordHasher`] | Argon2id password hashing | [OWASP Password Storage](https://cheatsheetseries.owasp.org/cheatsheets/Password_Storage_Cheat_Sheet.html) |
//! | [`AuthMiddleware`] | Request authentication | Actix-web middleware docs |
//! | [`AuthenticatedIdentity`] | Extractor for the authenticated identity | Actix-web extractors |
//!
//! ## Security Implementation (spec.md §4.6)
//!
//! - **JWT access tokens**, short-lived (`access_token_ttl_seconds`, default 15 min)
//! - **Opaque refresh tokens** (`oauth-engine::token`), rotated on use with
//!   reuse detection — never JWTs, so revocation doesn't wait on expiry
//! - **Argon2id password hashing** (OWASP recommended)
//! - **Scope-based authorization** rather than a role hierarchy — see
//!   [`middleware::RequireScope`]
//!
//! ## Token Flow
//!
//! ```text
//! ┌────────┐        ┌────────────┐        ┌────────────┐
//! │ Client │        │ oauth-engine│       │ Protected  │
//! └───┬────┘        └─────┬──────┘        │    API     │
//!     │                   │               └─────┬──────┘
//!     │ POST /token       │                     │
//!     │ (grant_type=...)  │                     │
//!     │──────────────────>│                     │
//!     │                   │                     │
//!     │ {access_token,    │                     │
//!     │  refresh_token}   │                     │
//!     │<──────────────────│                     │
//!     │                   │                     │
//!     │ GET /resource     │                     │
//!     │ Authorization:    │                     │
//!     │ Bearer <access>   │                     │
//!     │────────────────────────────────────────>│
//!     │                   │                     │
//!     │ 200 OK {data}     │                     │
//!     │<────────────────────────────────────────│
//!     │                   │                     │
//!     │ (after ttl)       │                     │
//!     │ POST /token       │                     │
//!     │ (grant_type=      │                     │
//!     │  refresh_token)   │                     │
//!     │──────────────────>│                     │
//!     │                   │                     │
//!     │ {new access_token,│                     │
//!     │  new refresh}     │                     │
//!     │<──────────────────│                     │
//! ```
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::auth::{JwtService, PasswordHasher, AuthenticatedIdentity};
//! use shared::config::AppConfig;
//!
//! let config = AppConfig::from_env()?;
//! let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
//! let password_hasher = PasswordHasher::new();
//!
//! // Protected handler (identity extracted from the bearer token)
//! async fn get_profile(identity: AuthenticatedIdentity) -> ApiResult<Profile> {
//!     profile_repo.find_by_identity_id(identity.identity_id).await
//! }
//! ```

pub mod jwt;
pub mod middleware;
pub mod password;

// Re-export main types for convenient access
pub use jwt::{AccessTokenClaims, Claims, JwtService};
pub use middleware::{AuthMiddleware, AuthenticatedIdentity, RequireScope};
pub use password::PasswordHasher;
