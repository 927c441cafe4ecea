//! # Request Handlers
//!
//! HTTP adapter for `/api/v1/eid` (spec.md §6). Each handler extracts and
//! validates its request, delegates to the composed engine services held
//! in [`AppState`], and maps the result onto the shared JSON envelope —
//! `ApiError` already implements the error half of that mapping.

use actix_web::{web, HttpRequest, HttpResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use mfa_engine::ChallengePurpose;
use shared::{errors::ApiError, validation};
use uuid::Uuid;

use crate::service::LoginOutcome;
use crate::AppState;

use super::dto::{
    ChangePasswordRequest, ClaimHandleRequest, ClaimHandleResponseDto, CompleteLoginMfaRequest,
    ConfirmHandleTransferRequest, ConfirmPasswordResetRequest, ConfirmTotpRequest, HandleCheckQuery,
    HealthResponse, IdentityDto, LoginRequest, LoginResponseDto, MessageResponse, OAuthAuthorizeQuery,
    OAuthAuthorizeResponseDto, OAuthTokenRequest, RefreshTokenRequest, RegisterRequest,
    RejectVerificationRequest, RequestHandleTransferRequest, RequestPasswordResetRequest,
    ReviewDecisionRequest, RevokeTokenRequest, SessionDto, SubmitVerificationRequest, TokenResponseDto,
    TotpEnrollmentDto, TransferInitiationResponseDto, VerificationQueueQuery,
};

// =============================================================================
// HEALTH CHECK
// =============================================================================

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "identity-service".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// =============================================================================
// REGISTRATION / PROFILE
// =============================================================================

/// `POST /api/v1/eid/identity`
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let summary = state.identity_service.register(&body.email, &body.password, &body.handle).await?;
    Ok(HttpResponse::Created().json(IdentityDto::from(&summary)))
}

/// `GET /api/v1/eid/identity/{id}`
pub async fn get_identity(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let summary = state.identity_service.get_identity(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(IdentityDto::from(&summary)))
}

// =============================================================================
// LOGIN
// =============================================================================

/// `POST /api/v1/eid/auth/login`
pub async fn login(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (device_descriptor, ip_address) = extract_device_info(&req);

    let outcome = state
        .identity_service
        .login(&body.email, &body.password, &body.client_id, &body.scope, device_descriptor, ip_address)
        .await?;

    Ok(HttpResponse::Ok().json(login_outcome_dto(outcome)))
}

/// `POST /api/v1/eid/auth/login/mfa` — completes a login paused on an MFA
/// challenge (spec.md §4.9 / §4.5 integration).
pub async fn complete_login_mfa(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CompleteLoginMfaRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let (device_descriptor, ip_address) = extract_device_info(&req);

    let outcome = state
        .identity_service
        .complete_login_mfa(
            body.challenge_id,
            &body.code,
            body.identity_id,
            &body.client_id,
            &body.scope,
            device_descriptor,
            ip_address,
        )
        .await?;

    Ok(HttpResponse::Ok().json(login_outcome_dto(outcome)))
}

fn login_outcome_dto(outcome: LoginOutcome) -> LoginResponseDto {
    match outcome {
        LoginOutcome::Tokens { tokens, session, identity } => LoginResponseDto::Authenticated {
            tokens: TokenResponseDto {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                token_type: tokens.token_type.to_string(),
                expires_in: tokens.expires_in,
                scope: tokens.scope,
            },
            session: SessionDto::from(&session),
            identity: IdentityDto::from(&identity),
        },
        LoginOutcome::MfaChallenge { challenge_id, method_hint } => {
            LoginResponseDto::MfaRequired { challenge_id, method_hint }
        }
    }
}

fn extract_device_info(req: &HttpRequest) -> (Option<String>, Option<String>) {
    let device_descriptor = req
        .headers()
        .get("X-Device-Fingerprint")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let ip_address = req.connection_info().peer_addr().map(String::from);
    (device_descriptor, ip_address)
}

// =============================================================================
// TOKEN REFRESH / REVOKE
// =============================================================================

/// `POST /api/v1/eid/auth/refresh`
pub async fn refresh_token(
    state: web::Data<AppState>,
    body: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let tokens = state
        .oauth_service
        .exchange_refresh_token(&body.client_id, None, &body.refresh_token, None)
        .await?;

    Ok(HttpResponse::Ok().json(TokenResponseDto {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: tokens.token_type.to_string(),
        expires_in: tokens.expires_in,
        scope: tokens.scope,
    }))
}

/// `POST /api/v1/eid/auth/revoke` — RFC 7009 token revocation (spec.md §4.6).
pub async fn revoke_token(
    state: web::Data<AppState>,
    body: web::Json<RevokeTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.oauth_service.revoke_refresh_token(&body.token).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Token revoked")))
}

/// `POST /api/v1/eid/auth/logout` — revokes the caller's own session.
pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;

    state.identity_service.revoke_session(claims.sub, claims.sid).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Logged out successfully")))
}

// =============================================================================
// SESSIONS
// =============================================================================

/// `GET /api/v1/eid/auth/sessions`
pub async fn list_sessions(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;

    let sessions = state.identity_service.list_sessions(claims.sub).await?;
    let dtos: Vec<SessionDto> = sessions.iter().map(SessionDto::from).collect();
    Ok(HttpResponse::Ok().json(dtos))
}

/// `DELETE /api/v1/eid/auth/sessions/{id}`
pub async fn revoke_session(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;

    state.identity_service.revoke_session(claims.sub, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Session revoked")))
}

// =============================================================================
// PASSWORD CHANGE / RESET
// =============================================================================

/// `POST /api/v1/eid/password/change`
pub async fn change_password(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;

    let body = body.into_inner();
    validation::validate_request(&body)?;

    let mfa_assertion = match (body.mfa_challenge_id, body.mfa_code) {
        (Some(challenge_id), Some(code)) => Some((challenge_id, code)),
        _ => None,
    };

    state
        .identity_service
        .change_password(
            claims.sub,
            &body.current_password,
            &body.new_password,
            claims.sid,
            body.revoke_other_sessions,
            mfa_assertion,
        )
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("Password changed")))
}

/// `POST /api/v1/eid/password-reset/request`
pub async fn request_password_reset(
    state: web::Data<AppState>,
    body: web::Json<RequestPasswordResetRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    // The outcome (and the token itself) is intentionally not surfaced in
    // the response — delivery happens out-of-band via email, outside this
    // crate's scope (spec.md's Non-goals exclude notification dispatch).
    state.identity_service.request_password_reset(&body.email).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("If that email is registered, a reset link was sent")))
}

/// `POST /api/v1/eid/password-reset/confirm`
pub async fn confirm_password_reset(
    state: web::Data<AppState>,
    body: web::Json<ConfirmPasswordResetRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    state.identity_service.confirm_password_reset(&body.token, &body.new_password).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password reset")))
}

// =============================================================================
// HANDLES (thin pass-through to C4)
// =============================================================================

/// `GET /api/v1/eid/handles/check?handle=...`
pub async fn check_handle(
    state: web::Data<AppState>,
    query: web::Query<HandleCheckQuery>,
) -> Result<HttpResponse, ApiError> {
    validation::validate_request(&query.0)?;
    let result = state.handle_service.check(&query.handle).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// `POST /api/v1/eid/handles/claim` — the anti-impersonation claim flow
/// (spec.md §4.4). The caller supplies the protected entry it's claiming
/// against directly; there is no server-side name lookup.
pub async fn claim_handle(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ClaimHandleRequest>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let outcome = state
        .handle_service
        .claim(body.handle_id, body.protected_entry_id, claims.sub, body.expected_version)
        .await?;

    Ok(HttpResponse::Ok().json(ClaimHandleResponseDto::from(outcome)))
}

/// `POST /api/v1/eid/handles/transfer` — initiates a two-phase handle
/// transfer (spec.md §4.4).
pub async fn request_handle_transfer(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RequestHandleTransferRequest>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let initiation = state
        .handle_service
        .request_transfer(body.handle_id, claims.sub, body.to_identity_id, body.expected_version)
        .await?;

    Ok(HttpResponse::Ok().json(TransferInitiationResponseDto::from(initiation)))
}

/// `POST /api/v1/eid/handles/transfer/confirm` — completes a transfer and
/// cuts the handle's outstanding sync jobs over to the new owner.
pub async fn confirm_handle_transfer(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ConfirmHandleTransferRequest>,
) -> Result<HttpResponse, ApiError> {
    extract_bearer_token(&req)?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let handle = state.handle_service.confirm_transfer(body.handle_id, &body.transfer_token).await?;
    Ok(HttpResponse::Ok().json(handle))
}

// =============================================================================
// OAUTH2 (thin pass-through to C6)
// =============================================================================

/// `GET /api/v1/eid/oauth/authorize` — issues an authorization code against
/// an already-authenticated session (spec.md §4.6).
pub async fn oauth_authorize(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<OAuthAuthorizeQuery>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;
    let query = query.into_inner();
    validation::validate_request(&query)?;

    let request = oauth_engine::AuthorizeRequest {
        client_id: query.client_id,
        redirect_uri: query.redirect_uri,
        scope: query.scope,
        state: query.state,
        code_challenge: query.code_challenge,
        code_challenge_method: query.code_challenge_method,
        identity_id: claims.sub,
        session_id: claims.sid,
    };

    let response = state.oauth_service.authorize(request).await?;
    Ok(HttpResponse::Ok().json(OAuthAuthorizeResponseDto::from(response)))
}

/// `POST /api/v1/eid/oauth/token` — RFC 6749 token endpoint, multiplexed on
/// `grant_type` (spec.md §4.6). Not behind a bearer check: the grant itself
/// is the credential.
pub async fn oauth_token(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<OAuthTokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let tokens = match body.grant_type.as_str() {
        "authorization_code" => {
            let code = body.code.ok_or_else(|| ApiError::BadRequest {
                message: "code is required for authorization_code grant".to_string(),
            })?;
            let redirect_uri = body.redirect_uri.ok_or_else(|| ApiError::BadRequest {
                message: "redirect_uri is required for authorization_code grant".to_string(),
            })?;
            let code_verifier = body.code_verifier.ok_or_else(|| ApiError::BadRequest {
                message: "code_verifier is required for authorization_code grant".to_string(),
            })?;
            let (device_descriptor, _) = extract_device_info(&req);

            state
                .oauth_service
                .exchange_authorization_code(
                    &body.client_id,
                    body.client_secret.as_deref(),
                    &redirect_uri,
                    &code,
                    &code_verifier,
                    Vec::new(),
                    "urn:identity:mfa:pwd",
                    device_descriptor,
                )
                .await?
        }
        "refresh_token" => {
            let refresh_token = body.refresh_token.ok_or_else(|| ApiError::BadRequest {
                message: "refresh_token is required for refresh_token grant".to_string(),
            })?;
            let (device_descriptor, _) = extract_device_info(&req);
            state
                .oauth_service
                .exchange_refresh_token(&body.client_id, body.client_secret.as_deref(), &refresh_token, device_descriptor)
                .await?
        }
        "client_credentials" => {
            let client_secret = body.client_secret.ok_or_else(|| ApiError::BadRequest {
                message: "client_secret is required for client_credentials grant".to_string(),
            })?;
            let scope = body.scope.unwrap_or_default();
            state.oauth_service.client_credentials_grant(&body.client_id, &client_secret, &scope).await?
        }
        other => {
            return Err(ApiError::BadRequest { message: format!("unsupported grant_type: {other}") });
        }
    };

    Ok(HttpResponse::Ok().json(TokenResponseDto {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: tokens.token_type.to_string(),
        expires_in: tokens.expires_in,
        scope: tokens.scope,
    }))
}

// =============================================================================
// MFA (thin pass-through to C5)
// =============================================================================

/// `POST /api/v1/eid/mfa/totp/enroll`
pub async fn enroll_totp(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;

    let enrollment = state.mfa_service.enroll_totp(claims.sub, "Unified Identity Authority", &claims.sub.to_string()).await?;
    Ok(HttpResponse::Ok().json(TotpEnrollmentDto::from(&enrollment)))
}

/// `POST /api/v1/eid/mfa/totp/confirm/{method_id}`
pub async fn confirm_totp(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<ConfirmTotpRequest>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let method = state.mfa_service.confirm_totp_enrollment(path.into_inner(), &body.code).await?;
    if method.identity_id == claims.sub {
        state.identity_service.mark_mfa_enabled(claims.sub).await?;
    }
    Ok(HttpResponse::Ok().json(MessageResponse::new("TOTP enrollment confirmed")))
}

/// `POST /api/v1/eid/mfa/challenge` — issues a standalone challenge for an
/// already-authenticated sensitive operation (spec.md §4.5).
pub async fn issue_mfa_challenge(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;

    let (challenge, method_hint, _plaintext) = state
        .mfa_service
        .issue_challenge(claims.sub, path.into_inner(), ChallengePurpose::SensitiveOp)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "challengeId": challenge.challenge_id,
        "methodHint": method_hint,
        "expiresAt": challenge.expires_at,
    })))
}

// =============================================================================
// VERIFICATION (thin pass-through to C7)
// =============================================================================

/// `GET /api/v1/eid/verification/{id}`
pub async fn get_verification_request(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    extract_bearer_token(&req)?;
    let request = state.verification_service.get_request(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(request))
}

/// `POST /api/v1/eid/verification/submit` — files a badge/verification
/// request with its supporting documents (spec.md §4.7).
pub async fn submit_verification_request(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SubmitVerificationRequest>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let mut documents = Vec::with_capacity(body.documents.len());
    for document in body.documents {
        let content = BASE64.decode(document.content_base64.as_bytes()).map_err(|_| ApiError::BadRequest {
            message: "contentBase64 is not valid base64".to_string(),
        })?;
        documents.push(verification_engine::DocumentUpload {
            document_type: document.document_type,
            blob_url: document.blob_url,
            content,
            mime_type: document.mime_type,
        });
    }

    // Priority is assigned by the engine itself from the request type
    // (spec.md §4.7's celebrity/business/government/standard tiers); the
    // façade doesn't second-guess it.
    let (request, _saved_documents) = state
        .verification_service
        .submit_request(claims.sub, body.request_type, verification_engine::DEFAULT_PRIORITY, documents)
        .await?;

    Ok(HttpResponse::Created().json(request))
}

/// `GET /api/v1/eid/verification/queue?limit=...` — the reviewer queue.
///
/// There's no RBAC/admin-role concept anywhere in this crate yet, so any
/// authenticated bearer can read the queue; this mirrors the identical
/// simplification `verification_service::DEFAULT_PRIORITY` already makes
/// for priority assignment (see DESIGN.md).
pub async fn list_verification_queue(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<VerificationQueueQuery>,
) -> Result<HttpResponse, ApiError> {
    extract_bearer_token(&req)?;
    let query = query.into_inner();
    validation::validate_request(&query)?;

    let queue = state.verification_service.list_queue(query.limit).await?;
    Ok(HttpResponse::Ok().json(queue))
}

/// `POST /api/v1/eid/verification/{id}/approve`
pub async fn approve_verification_request(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<ReviewDecisionRequest>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let request = state
        .verification_service
        .approve(path.into_inner(), claims.sub, body.expected_version)
        .await?;
    Ok(HttpResponse::Ok().json(request))
}

/// `POST /api/v1/eid/verification/{id}/reject`
pub async fn reject_verification_request(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<RejectVerificationRequest>,
) -> Result<HttpResponse, ApiError> {
    let access_token = extract_bearer_token(&req)?;
    let claims = state.jwt_service.validate_access_token(&access_token)?;
    let body = body.into_inner();
    validation::validate_request(&body)?;

    let request = state
        .verification_service
        .reject(path.into_inner(), claims.sub, body.expected_version, &body.reason)
        .await?;
    Ok(HttpResponse::Ok().json(request))
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

fn extract_bearer_token(req: &HttpRequest) -> Result<String, ApiError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingAuth)?;

    let token = shared::auth::jwt::JwtService::extract_from_header(header)?;
    if token.is_empty() {
        return Err(ApiError::InvalidToken);
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn extract_bearer_token_valid() {
        let req = TestRequest::default().insert_header(("Authorization", "Bearer my_token_123")).to_http_request();
        assert_eq!(extract_bearer_token(&req).unwrap(), "my_token_123");
    }

    #[test]
    fn extract_bearer_token_missing_header() {
        let req = TestRequest::default().to_http_request();
        assert!(extract_bearer_token(&req).is_err());
    }

    #[test]
    fn extract_bearer_token_wrong_scheme() {
        let req = TestRequest::default().insert_header(("Authorization", "Basic dXNlcjpwYXNz")).to_http_request();
        assert!(extract_bearer_token(&req).is_err());
    }
}
