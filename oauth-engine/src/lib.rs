//! # OAuth2 / Token Service (C6)
//!
//! Authorization-code+PKCE, client-credentials, and first-party password
//! grants; JWT access tokens; opaque refresh tokens with rotation and
//! reuse detection; validation and revocation (spec.md §4.6).
//!
//! Access tokens are minted via [`shared::auth::jwt::JwtService`] and never
//! persisted in full — only a hash of their `jti`, so revocation and the
//! validation cache never need to touch key material. Refresh tokens are
//! opaque 256-bit random strings, following the same generate-then-hash
//! idiom used for handle transfer tokens and MFA codes elsewhere in this
//! workspace.
//!
//! This crate does not verify passwords or MFA assertions itself — the
//! identity façade (C9) does that and then calls
//! [`service::OAuthService::issue_tokens_for_identity`] (password grant) or
//! the authorization-code/refresh paths once a bearer already holds a valid
//! code or token.

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{
    generate_token, hash_token, intersect_scopes, verify_pkce, AccessTokenRecord,
    AuthorizationCode, ChallengeMethod, GrantType, OAuthClient, RefreshTokenRecord, TokenStatus,
};
pub use repository::OAuthRepository;
pub use service::{
    AuthContext, AuthorizeRequest, AuthorizeResponse, OAuthService, TokenPair, KNOWN_SCOPES,
};
