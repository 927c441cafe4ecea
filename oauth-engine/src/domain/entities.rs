//! # OAuth2 Domain Entities
//!
//! Maps to the `oauth_clients`, `oauth_authorization_codes`,
//! `oauth_access_tokens`, and `oauth_refresh_tokens` tables (spec.md §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Grants a registered client is allowed to use (spec.md §4.6 "Supported grants").
/// Implicit flow is intentionally absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "oauth_grant_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    Password,
}

/// PKCE challenge method (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "pkce_method", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ChallengeMethod {
    S256,
    Plain,
}

/// A registered OAuth2 client (first-party façade, or a third-party app).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OAuthClient {
    pub client_id: String,
    /// Argon2id hash of the client secret. `None` for public clients
    /// (authorization-code+PKCE only, no secret to verify).
    pub client_secret_hash: Option<String>,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: Vec<String>,
    pub allowed_grant_types: Vec<GrantType>,
    /// Only trusted (first-party) clients may use `client_credentials`/`password`
    /// (spec.md §4.6: "client credentials (trusted apps only)").
    pub is_trusted: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl OAuthClient {
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant)
    }

    pub fn allows_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }
}

/// A single-use authorization code (spec.md §4.6 "Authorization code issuance").
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthorizationCode {
    pub code_id: Uuid,
    pub code_hash: String,
    pub client_id: String,
    pub identity_id: Uuid,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: ChallengeMethod,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// Lifecycle status shared by access and refresh tokens (spec.md §4.6
/// "State machine for tokens: active → {used (codes), revoked, expired}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "oauth_token_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Used,
    Revoked,
    Expired,
}

/// A minted access token's server-side record, keyed by a hash of its `jti`
/// (spec.md §4.6 "looks up `access_token_hash`"). The JWT itself is never
/// persisted — only enough to validate/revoke/audit it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessTokenRecord {
    pub access_token_id: Uuid,
    pub jti_hash: String,
    pub identity_id: Uuid,
    pub client_id: String,
    pub session_id: Uuid,
    pub scope: String,
    pub status: TokenStatus,
    pub use_count: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// An opaque refresh token row (spec.md §4.6 "Refresh token" +
/// "Refresh rotation with reuse detection"). Grounded directly on the
/// `RefreshToken` entity's family/generation/parent-chain design.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    pub refresh_token_id: Uuid,
    pub token_hash: String,
    pub identity_id: Uuid,
    pub client_id: String,
    pub session_id: Uuid,
    pub scope: String,
    /// Shared by every token descended from the authorization-code grant
    /// that started this family; constant across rotations.
    pub token_family: Uuid,
    /// `1` for the family's first token, `parent.generation + 1` on rotation.
    pub generation: i32,
    pub parent_token_id: Option<Uuid>,
    /// Set to the id of the token this one was rotated into, once rotated.
    pub rotated_to_id: Option<Uuid>,
    pub status: TokenStatus,
    pub device_descriptor: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == TokenStatus::Active && self.expires_at > now
    }
}
