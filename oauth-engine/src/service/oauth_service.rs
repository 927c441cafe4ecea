//! # OAuth2 / Token Service
//!
//! Authorization-code+PKCE, client-credentials, and the first-party
//! password grant; JWT access-token issuance; opaque refresh tokens with
//! rotation and reuse detection; validation with a Redis-backed cache;
//! revocation; and per-identity/IP/client rate limiting (spec.md §4.6).

use chrono::{Duration, Utc};
use uuid::Uuid;

use shared::auth::jwt::{AccessTokenClaims, Claims, JwtService};
use shared::auth::password::PasswordHasher;
use shared::config::{JwtConfig, OAuthConfig};
use shared::errors::ApiError;
use shared::redis_client::RedisClient;

use crate::domain::{
    generate_token, hash_token, intersect_scopes, join_scope, parse_scope, verify_pkce,
    AccessTokenRecord, AuthorizationCode, ChallengeMethod, GrantType, OAuthClient,
    RefreshTokenRecord, TokenStatus,
};
use crate::repository::OAuthRepository;

/// The set of scopes the authority recognizes. A client's `allowed_scopes`
/// is always further intersected against this set (spec.md §4.6).
pub const KNOWN_SCOPES: &[&str] = &["profile", "email", "handle", "mfa", "sync", "admin"];

/// Inputs to [`OAuthService::authorize`] (spec.md §4.6 "Authorization code issuance").
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: ChallengeMethod,
    pub identity_id: Uuid,
    pub session_id: Uuid,
}

/// Redirect-ready result of a successful authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizeResponse {
    pub redirect_uri: String,
    pub code: String,
    pub state: String,
}

/// An issued access+refresh token pair (spec.md §4.6 "Token pair issuance").
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scope: String,
}

/// Authentication context carried into a minted token (spec.md §4.6's
/// `amr`/`acr` claims). The façade (C9) builds this after it has already
/// verified the identity (password, MFA, etc.) — `oauth-engine` itself
/// never checks a password or an MFA code.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity_id: Uuid,
    pub session_id: Uuid,
    pub amr: Vec<String>,
    pub acr: String,
    pub device_descriptor: Option<String>,
}

pub struct OAuthService {
    repository: OAuthRepository,
    jwt: JwtService,
    password_hasher: PasswordHasher,
    redis: RedisClient,
    jwt_config: JwtConfig,
    oauth_config: OAuthConfig,
}

impl OAuthService {
    pub fn new(
        repository: OAuthRepository,
        jwt: JwtService,
        password_hasher: PasswordHasher,
        redis: RedisClient,
        jwt_config: JwtConfig,
        oauth_config: OAuthConfig,
    ) -> Self {
        Self {
            repository,
            jwt,
            password_hasher,
            redis,
            jwt_config,
            oauth_config,
        }
    }

    // =========================================================================
    // Rate limiting (spec.md §4.6 "Rate limiting")
    // =========================================================================

    async fn check_rate_limit(&self, bucket: &str, key: &str, limit_per_minute: u32) -> Result<(), ApiError> {
        let redis_key = format!("ratelimit:oauth:{bucket}:{key}");
        let count = self.redis.incr(&redis_key).await?;
        if count == 1 {
            self.redis
                .expire(&redis_key, std::time::Duration::from_secs(60))
                .await?;
        }
        if count as u32 > limit_per_minute {
            return Err(ApiError::TooManyRequests {
                retry_after_seconds: 60,
            });
        }
        Ok(())
    }

    /// Checks the three buckets spec.md §4.6 names for `/oauth/authorize`:
    /// per identity, per IP, per client.
    pub async fn check_authorize_rate_limit(
        &self,
        identity_id: Uuid,
        ip: &str,
        client_id: &str,
    ) -> Result<(), ApiError> {
        let limit = self.oauth_config.authorize_rate_limit_per_minute;
        self.check_rate_limit("authorize:identity", &identity_id.to_string(), limit).await?;
        self.check_rate_limit("authorize:ip", ip, limit).await?;
        self.check_rate_limit("authorize:client", client_id, limit).await
    }

    /// Checks the three buckets spec.md §4.6 names for `/oauth/token`.
    pub async fn check_token_rate_limit(&self, ip: &str, client_id: &str) -> Result<(), ApiError> {
        let limit = self.oauth_config.token_rate_limit_per_minute;
        self.check_rate_limit("token:ip", ip, limit).await?;
        self.check_rate_limit("token:client", client_id, limit).await
    }

    // =========================================================================
    // Authorization code issuance
    // =========================================================================

    pub async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResponse, ApiError> {
        let client = self
            .repository
            .find_client(&request.client_id)
            .await?
            .ok_or(ApiError::InvalidClient)?;

        if !client.is_active {
            return Err(ApiError::InvalidClient);
        }
        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(ApiError::InvalidClient);
        }
        if !client.allows_redirect_uri(&request.redirect_uri) {
            return Err(ApiError::InvalidArgument {
                message: "redirect_uri is not registered for this client".to_string(),
            });
        }

        let requested = parse_scope(&request.scope);
        let known: Vec<String> = KNOWN_SCOPES.iter().map(|s| s.to_string()).collect();
        let granted = intersect_scopes(&requested, &client.allowed_scopes, &known);
        if granted.is_empty() {
            return Err(ApiError::InvalidScope);
        }

        let raw_code = generate_token();
        let code_hash = hash_token(&raw_code);
        let now = Utc::now();

        let code = AuthorizationCode {
            code_id: Uuid::new_v4(),
            code_hash,
            client_id: request.client_id,
            identity_id: request.identity_id,
            redirect_uri: request.redirect_uri.clone(),
            scope: join_scope(&granted),
            code_challenge: request.code_challenge,
            code_challenge_method: request.code_challenge_method,
            session_id: request.session_id,
            expires_at: now + Duration::seconds(self.jwt_config.auth_code_ttl_seconds as i64),
            used_at: None,
            created_at: now,
        };

        self.repository.insert_authorization_code(&code).await?;

        Ok(AuthorizeResponse {
            redirect_uri: request.redirect_uri,
            code: raw_code,
            state: request.state,
        })
    }

    // =========================================================================
    // Token exchange: authorization_code grant
    // =========================================================================

    /// Verifies a client's credentials. Confidential clients (those with a
    /// stored secret hash) must present a matching secret; public clients
    /// (PKCE-only) must present none.
    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<OAuthClient, ApiError> {
        let client = self
            .repository
            .find_client(client_id)
            .await?
            .ok_or(ApiError::InvalidClient)?;

        if !client.is_active {
            return Err(ApiError::InvalidClient);
        }

        match (&client.client_secret_hash, client_secret) {
            (Some(hash), Some(secret)) => {
                if !self.password_hasher.verify(secret, hash)? {
                    return Err(ApiError::InvalidClient);
                }
            }
            (Some(_), None) => return Err(ApiError::InvalidClient),
            (None, _) => {}
        }

        Ok(client)
    }

    pub async fn exchange_authorization_code(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
        amr: Vec<String>,
        acr: &str,
        device_descriptor: Option<String>,
    ) -> Result<TokenPair, ApiError> {
        let client = self.authenticate_client(client_id, client_secret).await?;
        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(ApiError::InvalidClient);
        }

        let code_hash = hash_token(code);
        let stored = self
            .repository
            .find_authorization_code_by_hash(&code_hash)
            .await?
            .ok_or(ApiError::InvalidGrant { reuse_detected: false })?;

        if !stored.is_usable(Utc::now()) || stored.client_id != client_id || stored.redirect_uri != redirect_uri {
            return Err(ApiError::InvalidGrant { reuse_detected: false });
        }

        if !verify_pkce(stored.code_challenge_method, code_verifier, &stored.code_challenge) {
            return Err(ApiError::InvalidGrant { reuse_detected: false });
        }

        if !self.repository.mark_code_used(stored.code_id).await? {
            // Lost a race against a concurrent exchange of the same code.
            return Err(ApiError::InvalidGrant { reuse_detected: false });
        }

        let context = AuthContext {
            identity_id: stored.identity_id,
            session_id: stored.session_id,
            amr,
            acr: acr.to_string(),
            device_descriptor,
        };

        self.mint_token_pair(&client.client_id, &stored.scope, &context, None, Uuid::new_v4(), 1)
            .await
    }

    // =========================================================================
    // Token exchange: refresh_token grant, with rotation + reuse detection
    // =========================================================================

    pub async fn exchange_refresh_token(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        refresh_token: &str,
        device_descriptor: Option<String>,
    ) -> Result<TokenPair, ApiError> {
        let client = self.authenticate_client(client_id, client_secret).await?;
        if !client.allows_grant(GrantType::RefreshToken) {
            return Err(ApiError::InvalidClient);
        }

        let token_hash = hash_token(refresh_token);
        let stored = self
            .repository
            .find_refresh_token_by_hash(&token_hash)
            .await?
            .ok_or(ApiError::InvalidGrant { reuse_detected: false })?;

        if stored.client_id != client_id {
            return Err(ApiError::InvalidGrant { reuse_detected: false });
        }

        match stored.status {
            TokenStatus::Used | TokenStatus::Revoked => {
                self.revoke_family_and_invalidate_cache(stored.token_family).await?;
                return Err(ApiError::InvalidGrant { reuse_detected: true });
            }
            TokenStatus::Expired => {
                return Err(ApiError::InvalidGrant { reuse_detected: false });
            }
            TokenStatus::Active if stored.expires_at <= Utc::now() => {
                return Err(ApiError::InvalidGrant { reuse_detected: false });
            }
            TokenStatus::Active => {}
        }

        let context = AuthContext {
            identity_id: stored.identity_id,
            session_id: stored.session_id,
            amr: vec!["refresh".to_string()],
            acr: "urn:eid:acr:refresh".to_string(),
            device_descriptor: device_descriptor.or_else(|| stored.device_descriptor.clone()),
        };

        let new_refresh_id = Uuid::new_v4();
        let pair = self
            .mint_token_pair(
                &client.client_id,
                &stored.scope,
                &context,
                Some(stored.refresh_token_id),
                stored.token_family,
                stored.generation + 1,
            )
            .await?;

        // The new row is inserted by `mint_token_pair` before we can link the
        // old one to it, so link second; a guarded update means only one
        // winner of a concurrent rotation race survives.
        if !self
            .repository
            .mark_refresh_token_rotated(stored.refresh_token_id, new_refresh_id)
            .await?
        {
            self.revoke_family_and_invalidate_cache(stored.token_family).await?;
            return Err(ApiError::InvalidGrant { reuse_detected: true });
        }

        Ok(pair)
    }

    async fn revoke_family_and_invalidate_cache(&self, token_family: Uuid) -> Result<(), ApiError> {
        let sessions = self.repository.revoke_refresh_token_family(token_family).await?;
        for session_id in sessions {
            let hashes = self.repository.list_access_token_hashes_by_session(session_id).await?;
            for hash in hashes {
                self.redis.invalidate_token_validation(&hash).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Client credentials grant (trusted clients only)
    // =========================================================================

    pub async fn client_credentials_grant(
        &self,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<TokenPair, ApiError> {
        let client = self.authenticate_client(client_id, Some(client_secret)).await?;
        if !client.is_trusted || !client.allows_grant(GrantType::ClientCredentials) {
            return Err(ApiError::InvalidClient);
        }

        let requested = parse_scope(scope);
        let known: Vec<String> = KNOWN_SCOPES.iter().map(|s| s.to_string()).collect();
        let granted = intersect_scopes(&requested, &client.allowed_scopes, &known);
        if granted.is_empty() {
            return Err(ApiError::InvalidScope);
        }

        // Client-credentials tokens carry no subject identity; resource
        // servers must authorize off `client_id`, not `sub`.
        let context = AuthContext {
            identity_id: Uuid::nil(),
            session_id: Uuid::new_v4(),
            amr: vec!["client_credentials".to_string()],
            acr: "urn:eid:acr:client".to_string(),
            device_descriptor: None,
        };

        self.mint_access_token_only(&client.client_id, &join_scope(&granted), &context)
            .await
    }

    // =========================================================================
    // Password grant (first-party façade only — façade verifies the
    // password itself; this crate only mints the resulting token pair)
    // =========================================================================

    pub async fn issue_tokens_for_identity(
        &self,
        client_id: &str,
        scope: &str,
        context: AuthContext,
    ) -> Result<TokenPair, ApiError> {
        let client = self.repository.find_client(client_id).await?.ok_or(ApiError::InvalidClient)?;
        if !client.is_active || !client.is_trusted || !client.allows_grant(GrantType::Password) {
            return Err(ApiError::InvalidClient);
        }

        let requested = parse_scope(scope);
        let known: Vec<String> = KNOWN_SCOPES.iter().map(|s| s.to_string()).collect();
        let granted = intersect_scopes(&requested, &client.allowed_scopes, &known);
        if granted.is_empty() {
            return Err(ApiError::InvalidScope);
        }

        self.mint_token_pair(client_id, &join_scope(&granted), &context, None, Uuid::new_v4(), 1)
            .await
    }

    // =========================================================================
    // Shared token minting
    // =========================================================================

    async fn mint_access_token_record(
        &self,
        client_id: &str,
        scope: &str,
        context: &AuthContext,
    ) -> Result<(String, Uuid), ApiError> {
        let (token, jti) = self.jwt.generate_access_token(
            AccessTokenClaims {
                identity_id: context.identity_id,
                scope: scope.to_string(),
                client_id: client_id.to_string(),
                session_id: context.session_id,
                amr: context.amr.clone(),
                acr: context.acr.clone(),
            },
            self.jwt_config.access_token_ttl_seconds as i64,
        )?;

        let now = Utc::now();
        let record = AccessTokenRecord {
            access_token_id: Uuid::new_v4(),
            jti_hash: hash_token(&jti.to_string()),
            identity_id: context.identity_id,
            client_id: client_id.to_string(),
            session_id: context.session_id,
            scope: scope.to_string(),
            status: TokenStatus::Active,
            use_count: 0,
            issued_at: now,
            expires_at: now + Duration::seconds(self.jwt_config.access_token_ttl_seconds as i64),
            last_used_at: None,
        };
        self.repository.insert_access_token(&record).await?;

        Ok((token, jti))
    }

    async fn mint_access_token_only(
        &self,
        client_id: &str,
        scope: &str,
        context: &AuthContext,
    ) -> Result<TokenPair, ApiError> {
        let (access_token, _jti) = self.mint_access_token_record(client_id, scope, context).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: None,
            token_type: "Bearer",
            expires_in: self.jwt_config.access_token_ttl_seconds as i64,
            scope: scope.to_string(),
        })
    }

    async fn mint_token_pair(
        &self,
        client_id: &str,
        scope: &str,
        context: &AuthContext,
        parent_token_id: Option<Uuid>,
        token_family: Uuid,
        generation: i32,
    ) -> Result<TokenPair, ApiError> {
        let (access_token, _jti) = self.mint_access_token_record(client_id, scope, context).await?;

        let raw_refresh = generate_token();
        let refresh_hash = hash_token(&raw_refresh);
        let now = Utc::now();

        let refresh_record = RefreshTokenRecord {
            refresh_token_id: Uuid::new_v4(),
            token_hash: refresh_hash,
            identity_id: context.identity_id,
            client_id: client_id.to_string(),
            session_id: context.session_id,
            scope: scope.to_string(),
            token_family,
            generation,
            parent_token_id,
            rotated_to_id: None,
            status: TokenStatus::Active,
            device_descriptor: context.device_descriptor.clone(),
            expires_at: now + Duration::seconds(self.jwt_config.refresh_token_ttl_seconds as i64),
            created_at: now,
            last_used_at: None,
        };
        self.repository.insert_refresh_token(&refresh_record).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: Some(raw_refresh),
            token_type: "Bearer",
            expires_in: self.jwt_config.access_token_ttl_seconds as i64,
            scope: scope.to_string(),
        })
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validates an access token: signature/claims via [`JwtService`], then
    /// status via the database (cached 5 min per spec.md §4.6).
    pub async fn validate(&self, access_token: &str) -> Result<Claims, ApiError> {
        let claims = self.jwt.validate_access_token(access_token)?;
        let jti_hash = hash_token(&claims.jti.to_string());

        if let Some(valid) = self.redis.get_cached_token_validation::<bool>(&jti_hash).await? {
            if valid {
                return Ok(claims);
            }
            return Err(ApiError::InvalidToken);
        }

        let record = self
            .repository
            .find_access_token_by_hash(&jti_hash)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        let valid = record.status == TokenStatus::Active && record.expires_at > Utc::now();
        self.redis.cache_token_validation(&jti_hash, &valid).await?;

        if !valid {
            return Err(ApiError::InvalidToken);
        }

        self.repository.record_access_token_use(record.access_token_id).await?;
        Ok(claims)
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Revokes a single access token by its claims' `jti`.
    pub async fn revoke_access_token(&self, jti: Uuid) -> Result<(), ApiError> {
        let jti_hash = hash_token(&jti.to_string());
        if let Some(record) = self.repository.find_access_token_by_hash(&jti_hash).await? {
            self.repository.revoke_access_token(record.access_token_id).await?;
        }
        self.redis.invalidate_token_validation(&jti_hash).await
    }

    /// Revokes a refresh token; per spec.md §4.6 this revokes its entire family.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), ApiError> {
        let token_hash = hash_token(refresh_token);
        let Some(stored) = self.repository.find_refresh_token_by_hash(&token_hash).await? else {
            return Ok(());
        };
        self.revoke_family_and_invalidate_cache(stored.token_family).await
    }

    /// Revokes every token bound to a session (spec.md §4.6 `revoke_session`).
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<(), ApiError> {
        let hashes = self.repository.list_access_token_hashes_by_session(session_id).await?;
        self.repository.revoke_session_tokens(session_id).await?;
        for hash in hashes {
            self.redis.invalidate_token_validation(&hash).await?;
        }
        self.redis.invalidate_session(&session_id.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_scopes_nonempty() {
        assert!(!KNOWN_SCOPES.is_empty());
    }

    #[test]
    fn test_scope_grant_intersection_excludes_unknown() {
        let requested = vec!["profile".to_string(), "made_up_scope".to_string()];
        let allowed = vec!["profile".to_string(), "made_up_scope".to_string()];
        let known: Vec<String> = KNOWN_SCOPES.iter().map(|s| s.to_string()).collect();

        let granted = intersect_scopes(&requested, &allowed, &known);
        assert_eq!(granted, vec!["profile".to_string()]);
    }
}
