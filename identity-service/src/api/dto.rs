//! # Data Transfer Objects (DTOs)
//!
//! API contract for `/api/v1/eid` (spec.md §6). Request DTOs carry
//! `validator` rules; response DTOs are camelCase to match the other
//! components' frontend conventions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{IdentitySummary, Session};

// =============================================================================
// REGISTRATION
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 255, message = "Email too long"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 2, max = 30, message = "Handle must be 2-30 characters"))]
    pub handle: String,
}

// =============================================================================
// LOGIN
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// The OAuth client requesting tokens (spec.md §4.6). Defaults to the
    /// first-party web client if omitted.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_login_scope")]
    pub scope: String,
}

fn default_client_id() -> String {
    "eid-web".to_string()
}

fn default_login_scope() -> String {
    "profile".to_string()
}

/// Submitted to complete a login that was paused on an MFA challenge
/// (spec.md §4.9 / §4.5 integration).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLoginMfaRequest {
    pub challenge_id: Uuid,

    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,

    pub identity_id: Uuid,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_login_scope")]
    pub scope: String,
}

// =============================================================================
// TOKEN REFRESH / LOGOUT
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,

    pub client_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    pub client_id: String,
}

// =============================================================================
// PASSWORD CHANGE / RESET
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub new_password: String,

    #[serde(default)]
    pub revoke_other_sessions: bool,

    /// Present only when completing an MFA challenge the policy gate
    /// issued on a prior call to this same endpoint (spec.md §4.9).
    #[serde(default)]
    pub mfa_challenge_id: Option<Uuid>,

    #[serde(default)]
    pub mfa_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestPasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPasswordResetRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub new_password: String,
}

// =============================================================================
// RESPONSE TYPES
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponseDto {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// Either a minted token pair, or a pointer to the MFA challenge the client
/// must complete before tokens are issued (spec.md §4.9 "Login").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum LoginResponseDto {
    #[serde(rename = "authenticated")]
    Authenticated {
        tokens: TokenResponseDto,
        session: SessionDto,
        identity: IdentityDto,
    },
    #[serde(rename = "mfa_required")]
    MfaRequired { challenge_id: Uuid, method_hint: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDto {
    pub identity_id: Uuid,
    pub email: String,
    pub handle_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_badge: Option<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&IdentitySummary> for IdentityDto {
    fn from(summary: &IdentitySummary) -> Self {
        Self {
            identity_id: summary.identity_id,
            email: summary.email.clone(),
            handle_id: summary.handle_id,
            status: summary.status.to_string(),
            verification_badge: summary.verification_badge.clone(),
            mfa_enabled: summary.mfa_enabled,
            created_at: summary.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub session_id: Uuid,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_descriptor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub mfa_asserted: bool,
}

impl From<&Session> for SessionDto {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id,
            client_id: session.client_id.clone(),
            device_descriptor: session.device_descriptor.clone(),
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            expires_at: session.expires_at,
            mfa_asserted: session.mfa_asserted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}

// =============================================================================
// HANDLE CHECK (thin pass-through to C4)
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HandleCheckQuery {
    #[validate(length(min = 1, max = 30))]
    pub handle: String,
}

// =============================================================================
// HANDLE CLAIM / TRANSFER (thin pass-through to C4)
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClaimHandleRequest {
    pub handle_id: Uuid,
    pub protected_entry_id: Uuid,
    pub expected_version: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestHandleTransferRequest {
    pub handle_id: Uuid,
    pub to_identity_id: Uuid,
    pub expected_version: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmHandleTransferRequest {
    pub handle_id: Uuid,

    #[validate(length(min = 1, message = "Transfer token is required"))]
    pub transfer_token: String,
}

/// `handle_engine::ClaimOutcome` carries no `Serialize` impl of its own
/// (it's an internal service-layer return type); this is the wire
/// response `POST /handles/claim` actually returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimHandleResponseDto {
    pub handle: handle_engine::Handle,
    pub verification_priority: i16,
}

impl From<handle_engine::ClaimOutcome> for ClaimHandleResponseDto {
    fn from(outcome: handle_engine::ClaimOutcome) -> Self {
        Self { handle: outcome.handle, verification_priority: outcome.verification_priority }
    }
}

/// Same reasoning as [`ClaimHandleResponseDto`], for `handle_engine::TransferInitiation`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInitiationResponseDto {
    pub handle: handle_engine::Handle,
    pub transfer_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<handle_engine::TransferInitiation> for TransferInitiationResponseDto {
    fn from(initiation: handle_engine::TransferInitiation) -> Self {
        Self {
            handle: initiation.handle,
            transfer_token: initiation.transfer_token,
            expires_at: initiation.expires_at,
        }
    }
}

// =============================================================================
// OAUTH2 (thin pass-through to C6)
// =============================================================================

/// Query parameters for `GET /oauth/authorize` (spec.md §4.6). The caller
/// must already hold a valid access token — this isn't a login page, it's
/// the authorization-code issuance step of a flow the user is already
/// signed into.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OAuthAuthorizeQuery {
    pub client_id: String,

    #[validate(length(min = 1, message = "redirect_uri is required"))]
    pub redirect_uri: String,

    #[serde(default)]
    pub scope: String,

    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,

    #[validate(length(min = 43, message = "code_challenge must be derived from a 43+ char verifier"))]
    pub code_challenge: String,

    pub code_challenge_method: oauth_engine::ChallengeMethod,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthAuthorizeResponseDto {
    pub redirect_uri: String,
    pub code: String,
    pub state: String,
}

impl From<oauth_engine::AuthorizeResponse> for OAuthAuthorizeResponseDto {
    fn from(response: oauth_engine::AuthorizeResponse) -> Self {
        Self { redirect_uri: response.redirect_uri, code: response.code, state: response.state }
    }
}

/// Body for `POST /oauth/token` (spec.md §4.6), multiplexed on
/// `grant_type` the way RFC 6749's token endpoint is — one route, one
/// request shape, most fields optional depending on the grant.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct OAuthTokenRequest {
    pub grant_type: String,
    pub client_id: String,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default)]
    pub code_verifier: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

// =============================================================================
// VERIFICATION (thin pass-through to C7)
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVerificationRequest {
    pub request_type: verification_engine::RequestType,

    #[serde(default)]
    #[validate(nested)]
    pub documents: Vec<DocumentUploadDto>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadDto {
    #[validate(length(min = 1, message = "documentType is required"))]
    pub document_type: String,

    #[validate(length(min = 1, message = "blobUrl is required"))]
    pub blob_url: String,

    /// Base64-encoded document bytes, hashed server-side for content
    /// addressing (spec.md §4.7) — never stored in this form.
    #[validate(length(min = 1, message = "contentBase64 is required"))]
    pub content_base64: String,

    #[validate(length(min = 1, message = "mimeType is required"))]
    pub mime_type: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerificationQueueQuery {
    #[serde(default = "default_queue_limit")]
    pub limit: i64,
}

fn default_queue_limit() -> i64 {
    20
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecisionRequest {
    pub expected_version: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectVerificationRequest {
    pub expected_version: i64,

    #[validate(length(min = 1, message = "reason is required"))]
    pub reason: String,
}

// =============================================================================
// MFA
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmTotpRequest {
    #[validate(length(min = 6, max = 10, message = "Code is required"))]
    pub code: String,
}

/// Response for `POST /mfa/totp/enroll` — `mfa_engine::TotpEnrollment` carries
/// the domain `MfaMethod` row, which this crate never exposes wholesale over
/// HTTP (it holds the encrypted secret).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpEnrollmentDto {
    pub method_id: Uuid,
    pub secret_base32: String,
    pub otpauth_url: String,
}

impl From<&mfa_engine::TotpEnrollment> for TotpEnrollmentDto {
    fn from(enrollment: &mfa_engine::TotpEnrollment) -> Self {
        Self {
            method_id: enrollment.method.method_id,
            secret_base32: enrollment.secret_base32.clone(),
            otpauth_url: enrollment.otpauth_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn register_request_valid() {
        let request = RegisterRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
            handle: "testuser".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn register_request_rejects_short_password() {
        let request = RegisterRequest {
            email: "test@example.com".to_string(),
            password: "short".to_string(),
            handle: "testuser".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn login_request_defaults_apply() {
        let json = r#"{"email":"a@b.com","password":"x"}"#;
        let request: LoginRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.client_id, "eid-web");
        assert_eq!(request.scope, "profile");
    }

    #[test]
    fn message_response_new() {
        let response = MessageResponse::new("ok");
        assert_eq!(response.message, "ok");
    }
}
