//! # Authentication Middleware for Actix-web
//!
//! Extracts and validates JWT access tokens from HTTP requests.
//!
//! ## Overview
//!
//! This module provides:
//!
//! | Component | Purpose | Usage |
//! |-----------|---------|-------|
//! | [`AuthMiddleware`] | Extract and validate JWT | Service-level authentication |
//! | [`AuthenticatedIdentity`] | Extractor for handlers | Get current identity in handlers |
//! | [`RequireScope`] | Route guards | Restrict routes by OAuth2 scope |
//!
//! ## Authentication Flow
//!
//! ```text
//! ┌─────────┐     ┌──────────────┐     ┌─────────────┐     ┌─────────┐
//! │ Request │────►│ AuthMiddleware│────►│ Extract JWT │────►│ Validate│
//! └─────────┘     └──────────────┘     └─────────────┘     └────┬────┘
//!                                                                │
//!                 ┌──────────────┐     ┌──────────────────┐     │
//!                 │   Handler    │◄────│ Insert Identity  │◄────┘
//!                 │(Authenticated│     │ into Extensions  │  (if valid)
//!                 │  Identity)   │     │                  │
//!                 └──────────────┘     └──────────────────┘
//! ```
//!
//! ## Authorization Model
//!
//! Unlike a role hierarchy, this system authorizes by OAuth2 scope
//! (spec.md §4.6): a token either carries the scope a route requires or it
//! doesn't. `admin:review` is the one scope that behaves like a privileged
//! role — it's granted only to verification reviewer accounts and gates the
//! `verification-engine` admin queue endpoints.
//!
//! ## Usage Example
//!
//! ### Setup Middleware
//!
//! ```rust,ignore
//! use shared::auth::{AuthMiddleware, JwtService};
//! use std::sync::Arc;
//!
//! let jwt_service = Arc::new(JwtService::new(config.jwt));
//! let auth_middleware = AuthMiddleware::new(jwt_service);
//!
//! App::new()
//!     .service(
//!         web::scope("/api")
//!             .wrap(auth_middleware)
//!             .route("/profile", web::get().to(get_profile))
//!     )
//! ```
//!
//! ### Use in Handlers
//!
//! ```rust,ignore
//! use shared::auth::AuthenticatedIdentity;
//!
//! async fn get_profile(identity: AuthenticatedIdentity) -> impl Responder {
//!     format!("Hello, {}!", identity.identity_id)
//! }
//! ```
//!
//! ### Scope Guards
//!
//! ```rust,ignore
//! use shared::auth::RequireScope;
//!
//! #[get("/admin/verifications", guard = "RequireScope::admin_review")]
//! async fn review_queue(identity: AuthenticatedIdentity) -> impl Responder {
//!     // Only reaches here if the token carries `admin:review`
//! }
//! ```
//!
//! ## Related Documentation
//!
//! - [`crate::auth::jwt`] - JWT token validation
//! - [`crate::errors::ApiError`] - Authentication errors

use crate::auth::jwt::{Claims, JwtService};
use crate::errors::ApiError;
use actix_web::{dev::ServiceRequest, Error, HttpMessage};
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Authenticated Identity
// =============================================================================

/// The identity extracted from a validated JWT access token.
///
/// Inserted into request extensions after successful authentication and
/// extracted in handlers via the `FromRequest` impl below.
///
/// ## Fields
///
/// - `identity_id`: the subject of the token (spec.md §4.1 identity id)
/// - `session_id`: the session the token is bound to (`sid` claim)
/// - `client_id`: the OAuth client the token was issued to
/// - `scope`: granted scopes, already split on whitespace
/// - `amr` / `acr`: authentication method/context references, used by
///   MFA-gated routes to check whether step-up auth already happened
///
/// ## Example
///
/// ```rust,ignore
/// async fn handler(identity: AuthenticatedIdentity) -> impl Responder {
///     if identity.has_scope("admin:review") {
///         // privileged reviewer route
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub identity_id: Uuid,
    pub session_id: Uuid,
    pub client_id: String,
    pub scope: Vec<String>,
    pub amr: Vec<String>,
    pub acr: String,
}

impl AuthenticatedIdentity {
    /// Returns `true` if the token carries the given scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }

    /// Returns `true` if MFA was performed during the session that minted
    /// this token (`amr` contains anything other than `pwd`).
    pub fn completed_mfa(&self) -> bool {
        self.amr.iter().any(|m| m != "pwd")
    }
}

/// Converts validated JWT claims into an [`AuthenticatedIdentity`].
impl From<Claims> for AuthenticatedIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            identity_id: claims.sub,
            session_id: claims.sid,
            client_id: claims.client_id,
            scope: claims
                .scope
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            amr: claims.amr,
            acr: claims.acr,
        }
    }
}

// =============================================================================
// Auth Middleware
// =============================================================================

/// Middleware for JWT-based authentication.
///
/// This middleware:
/// 1. Extracts the JWT from the `Authorization` header
/// 2. Validates the token signature and claims
/// 3. Inserts the authenticated user into request extensions
///
/// ## Setup
///
/// ```rust,ignore
/// let jwt_service = Arc::new(JwtService::new(config.jwt));
/// let auth = AuthMiddleware::new(jwt_service);
///
/// App::new()
///     .service(
///         web::scope("/api")
///             .wrap(auth)
///             .route("/protected", web::get().to(handler))
///     )
/// ```
#[derive(Clone)]
pub struct AuthMiddleware {
    /// JWT service for token validation
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    /// Creates a new authentication middleware.
    ///
    /// ## Parameters
    ///
    /// - `jwt_service`: Shared JWT service for token validation
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self { jwt_service }
    }

    /// Extracts and validates the identity from a request.
    ///
    /// This is the core authentication logic:
    /// 1. Get the `Authorization` header
    /// 2. Extract the Bearer token
    /// 3. Validate the JWT
    /// 4. Convert claims to `AuthenticatedIdentity`
    ///
    /// ## Errors
    ///
    /// - `ApiError::MissingAuth` - No Authorization header
    /// - `ApiError::InvalidToken` - Malformed token or invalid signature
    /// - `ApiError::TokenExpired` - Token has expired
    pub fn extract_identity(
        &self,
        req: &ServiceRequest,
    ) -> Result<AuthenticatedIdentity, ApiError> {
        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::MissingAuth)?;

        let token = JwtService::extract_from_header(auth_header)?;

        let claims = self.jwt_service.validate_access_token(token)?;

        Ok(AuthenticatedIdentity::from(claims))
    }

    /// Authenticates a request and stores the identity in extensions.
    ///
    /// Call this from middleware to authenticate the request. The identity
    /// will be available via the `AuthenticatedIdentity` extractor.
    ///
    /// ## Errors
    ///
    /// Returns authentication errors if the token is missing or invalid.
    pub fn authenticate(&self, req: &ServiceRequest) -> Result<(), ApiError> {
        let identity = self.extract_identity(req)?;
        req.extensions_mut().insert(identity);
        Ok(())
    }
}

// =============================================================================
// Actix-web Extractor
// =============================================================================

/// Extractor for getting the authenticated identity in handlers.
///
/// This implements Actix-web's `FromRequest` trait, allowing you to
/// simply add `AuthenticatedIdentity` as a handler parameter.
///
/// ## Example
///
/// ```rust,ignore
/// async fn handler(identity: AuthenticatedIdentity) -> impl Responder {
///     format!("Hello, {}!", identity.identity_id)
/// }
/// ```
///
/// ## Errors
///
/// Returns `ApiError::MissingAuth` if no identity is in request extensions.
/// This happens if authentication middleware wasn't applied.
impl actix_web::FromRequest for AuthenticatedIdentity {
    type Error = Error;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let result = req
            .extensions()
            .get::<AuthenticatedIdentity>()
            .cloned()
            .ok_or_else(|| ApiError::MissingAuth.into());

        std::future::ready(result)
    }
}

// =============================================================================
// Scope Guards
// =============================================================================

/// Route guards for scope-based access control.
///
/// Use these as guards in route definitions to restrict access based on the
/// scopes granted to the bearer token.
///
/// ## Example
///
/// ```rust,ignore
/// use actix_web::get;
/// use shared::auth::{RequireScope, AuthenticatedIdentity};
///
/// #[get("/admin/verifications", guard = "RequireScope::admin_review")]
/// async fn review_queue(identity: AuthenticatedIdentity) -> impl Responder {
///     "Review queue"
/// }
/// ```
pub struct RequireScope;

impl RequireScope {
    /// Guard that requires the `admin:review` scope (verification-engine's
    /// reviewer queue, spec.md C7).
    pub fn admin_review(req: &actix_web::guard::GuardContext) -> bool {
        Self::check_scope(req, "admin:review")
    }

    /// Guard that requires the `identity:write` scope (handle changes,
    /// profile mutation).
    pub fn identity_write(req: &actix_web::guard::GuardContext) -> bool {
        Self::check_scope(req, "identity:write")
    }

    /// Guard that requires the `sync:admin` scope (sync-engine operator
    /// endpoints — requeue, rollback).
    pub fn sync_admin(req: &actix_web::guard::GuardContext) -> bool {
        Self::check_scope(req, "sync:admin")
    }

    /// Internal helper to check if the request's identity carries a scope.
    fn check_scope(req: &actix_web::guard::GuardContext, required: &str) -> bool {
        req.req_data()
            .get::<AuthenticatedIdentity>()
            .map(|identity| identity.has_scope(required))
            .unwrap_or(false)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_claims(scope: &str) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            iss: "entativa-id".to_string(),
            aud: "entativa-id-api".to_string(),
            scope: scope.to_string(),
            client_id: "c1".to_string(),
            sid: Uuid::new_v4(),
            exp: 0,
            iat: 0,
            amr: vec!["pwd".to_string()],
            acr: "urn:eid:acr:1".to_string(),
            jti: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_identity_from_claims_splits_scope() {
        let claims = test_claims("profile email admin:review");
        let identity = AuthenticatedIdentity::from(claims.clone());

        assert_eq!(identity.identity_id, claims.sub);
        assert_eq!(identity.session_id, claims.sid);
        assert_eq!(identity.scope, vec!["profile", "email", "admin:review"]);
    }

    #[test]
    fn test_has_scope() {
        let identity = AuthenticatedIdentity::from(test_claims("profile admin:review"));
        assert!(identity.has_scope("admin:review"));
        assert!(!identity.has_scope("sync:admin"));
    }

    #[test]
    fn test_completed_mfa_false_when_only_password() {
        let mut claims = test_claims("profile");
        claims.amr = vec!["pwd".to_string()];
        let identity = AuthenticatedIdentity::from(claims);
        assert!(!identity.completed_mfa());
    }

    #[test]
    fn test_completed_mfa_true_when_otp_present() {
        let mut claims = test_claims("profile");
        claims.amr = vec!["pwd".to_string(), "otp".to_string()];
        let identity = AuthenticatedIdentity::from(claims);
        assert!(identity.completed_mfa());
    }

    #[test]
    fn test_empty_scope_has_no_scopes() {
        let identity = AuthenticatedIdentity::from(test_claims(""));
        assert!(identity.scope.is_empty());
        assert!(!identity.has_scope("profile"));
    }
}

