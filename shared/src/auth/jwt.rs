//! # JWT Access Token Service
//!
//! Signs and validates the JWT access tokens issued by the OAuth2 / token
//! service (spec.md §4.6). Refresh tokens are **not** JWTs in this system —
//! they are opaque 256-bit random strings (see `oauth-engine::token`) so that
//! revocation and rotation-with-reuse-detection can be enforced purely at the
//! database layer, without waiting for a JWT to expire.
//!
//! ## Token Structure
//!
//! ```text
//! xxxxx.yyyyy.zzzzz
//! ├────┼─────┼────┤
//! │    │     │    └── Signature (verifies integrity)
//! │    │     └─────── Payload (claims)
//! │    └───────────── Header (algorithm, kid)
//! ```
//!
//! ## Claims (spec.md §4.6)
//!
//! | Claim | Description |
//! |-------|-------------|
//! | `iss` | Issuer, e.g. `entativa-id` |
//! | `sub` | Subject — the identity id |
//! | `aud` | Audience |
//! | `scope` | Space-delimited granted scopes |
//! | `client_id` | OAuth client that requested the token |
//! | `sid` | Session id the token is bound to |
//! | `exp` / `iat` | Expiration / issued-at, Unix timestamps |
//! | `amr` | Authentication methods references (e.g. `["pwd", "otp"]`) |
//! | `acr` | Authentication context class reference |
//! | `jti` | Unique token id, used for the token-validation cache key |
//!
//! ## Security Notes
//!
//! - Signing algorithm is configurable (`JwtConfig::algorithm`); `HS256` is
//!   the default (see DESIGN.md for the Open Question resolution).
//! - The `kid` header carries `JwtConfig::signing_key_id` for key rotation.

use crate::config::JwtConfig;
use crate::errors::ApiError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT access-token claims (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the identity's unique identifier (UUID).
    pub sub: Uuid,

    /// Issuer — identifies the authority that minted the token.
    pub iss: String,

    /// Audience — identifies the resource server(s) the token is valid for.
    pub aud: String,

    /// Space-delimited scopes granted to this token.
    pub scope: String,

    /// OAuth client id the token was issued to.
    pub client_id: String,

    /// Session id this token is bound to.
    pub sid: Uuid,

    /// Expiration time as Unix timestamp.
    pub exp: i64,

    /// Issued-at time as Unix timestamp.
    pub iat: i64,

    /// Authentication methods references, e.g. `["pwd"]` or `["pwd", "otp"]`.
    pub amr: Vec<String>,

    /// Authentication context class reference.
    pub acr: String,

    /// JWT id — unique per token, used as the token-validation cache key and
    /// for blacklisting on revocation.
    pub jti: Uuid,
}

/// Parameters required to mint an access token, grouped so
/// [`JwtService::generate_access_token`] doesn't need a long positional
/// argument list.
#[derive(Debug, Clone)]
pub struct AccessTokenClaims {
    pub identity_id: Uuid,
    pub scope: String,
    pub client_id: String,
    pub session_id: Uuid,
    pub amr: Vec<String>,
    pub acr: String,
}

/// Service for access-token generation and validation.
///
/// Created once at startup from [`JwtConfig`] and shared (it is `Clone`,
/// cheap to clone, and internally immutable) across the façade and the
/// OAuth2 token service.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: JwtConfig,
}

impl JwtService {
    /// Creates a new JWT service with the given configuration.
    ///
    /// Only `HS256` is implemented; other `config.algorithm` values are
    /// accepted but currently signed/verified as `HS256` (single-key
    /// deployments only — see DESIGN.md).
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            encoding_key,
            decoding_key,
            config,
        }
    }

    /// Mints a signed access token (spec.md §4.6 "Token pair issuance").
    ///
    /// `expires_in_seconds` lets the caller apply `JwtConfig::access_token_ttl_seconds`
    /// or a shorter override (e.g. for step-up MFA tickets).
    pub fn generate_access_token(
        &self,
        claims: AccessTokenClaims,
        expires_in_seconds: i64,
    ) -> Result<(String, Uuid), ApiError> {
        let now = Utc::now();
        let jti = Uuid::new_v4();

        let full_claims = Claims {
            sub: claims.identity_id,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            scope: claims.scope,
            client_id: claims.client_id,
            sid: claims.session_id,
            exp: (now + Duration::seconds(expires_in_seconds)).timestamp(),
            iat: now.timestamp(),
            amr: claims.amr,
            acr: claims.acr,
            jti,
        };

        let mut header = Header::default();
        header.kid = Some(self.config.signing_key_id.clone());

        let token = encode(&header, &full_claims, &self.encoding_key).map_err(|e| {
            ApiError::InternalError {
                message: format!("Failed to generate access token: {}", e),
            }
        })?;

        Ok((token, jti))
    }

    /// Validates and decodes an access token.
    ///
    /// Verifies signature, `iss`, `aud`, and `exp`. Does **not** check the
    /// revocation/blacklist cache — callers (`oauth-engine::token::validate`)
    /// layer that on top, since it requires a Redis round-trip this function
    /// deliberately stays free of.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
                _ => ApiError::InvalidToken,
            })?;

        Ok(token_data.claims)
    }

    /// Extracts the bearer token from an `Authorization` header value.
    pub fn extract_from_header(auth_header: &str) -> Result<&str, ApiError> {
        auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::InvalidToken)
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test_secret_key_minimum_32_chars_required".to_string(),
            access_token_ttl_seconds: 3600,
            refresh_token_ttl_seconds: 2_592_000,
            issuer: "test-issuer".to_string(),
            audience: "test-audience".to_string(),
            algorithm: "HS256".to_string(),
            signing_key_id: "test-key".to_string(),
            auth_code_ttl_seconds: 600,
            reset_token_ttl_seconds: 900,
        }
    }

    fn test_claims(identity_id: Uuid, session_id: Uuid) -> AccessTokenClaims {
        AccessTokenClaims {
            identity_id,
            scope: "profile email".to_string(),
            client_id: "c1".to_string(),
            session_id,
            amr: vec!["pwd".to_string()],
            acr: "urn:eid:acr:1".to_string(),
        }
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let service = JwtService::new(test_config());
        let identity_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let (token, jti) = service
            .generate_access_token(test_claims(identity_id, session_id), 3600)
            .unwrap();

        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, identity_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.jti, jti);
        assert_eq!(claims.scope, "profile email");
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = JwtService::new(test_config());
        let (token, _) = service
            .generate_access_token(test_claims(Uuid::new_v4(), Uuid::new_v4()), -10)
            .unwrap();

        let result = service.validate_access_token(&token);
        assert!(matches!(result, Err(ApiError::TokenExpired)));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let service = JwtService::new(test_config());
        let (token, _) = service
            .generate_access_token(test_claims(Uuid::new_v4(), Uuid::new_v4()), 3600)
            .unwrap();

        let mut tampered = token.clone();
        tampered.push('x');

        let result = service.validate_access_token(&tampered);
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_extract_from_header_valid() {
        let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";
        let header = format!("Bearer {}", token);

        let extracted = JwtService::extract_from_header(&header).unwrap();
        assert_eq!(extracted, token);
    }

    #[test]
    fn test_extract_from_header_invalid() {
        let result = JwtService::extract_from_header("InvalidHeader token");
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let service = JwtService::new(test_config());
        let id = Uuid::new_v4();
        let sid = Uuid::new_v4();

        let (_, jti1) = service
            .generate_access_token(test_claims(id, sid), 3600)
            .unwrap();
        let (_, jti2) = service
            .generate_access_token(test_claims(id, sid), 3600)
            .unwrap();

        assert_ne!(jti1, jti2);
    }
}
