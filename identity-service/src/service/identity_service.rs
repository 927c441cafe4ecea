//! # Identity Service
//!
//! Composition root for registration, authentication, and session
//! lifecycle (spec.md §4.9). Orchestrates C1 (password hashing), C4
//! (handle allocation), C5 (MFA policy gate), C6 (token issuance), and C8
//! (sync job enqueue) behind the single `/api/v1/eid` surface.

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use eid_crypto::{PasswordHasher, PasswordValidator};
use handle_engine::domain::NewHandle;
use handle_engine::{HandleRepository, HandleService};
use mfa_engine::{ChallengePurpose, MfaDecision, MfaService};
use oauth_engine::{AuthContext, OAuthService, TokenPair};
use shared::config::LockoutConfig;
use shared::errors::ApiError;
use shared::redis_client::RedisClient;
use sync_engine::{ConflictResolution, NewSyncJob, SyncPriority, SyncService};

use crate::domain::{Identity, IdentityStatus, IdentitySummary, NewIdentity, NewSession, Session};
use crate::repository::{IdentityRepository, SessionRepository};

/// A password hash of a value nobody can ever submit, used to keep
/// `login`'s password verification branch timing-uniform when the email
/// lookup misses (spec.md §4.9 "login must not leak account existence via
/// timing"). Computed once per process since Argon2 hashing is expensive.
fn dummy_hash() -> &'static str {
    static DUMMY: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    DUMMY.get_or_init(|| {
        PasswordHasher::new()
            .hash("correct-horse-battery-staple-unreachable")
            .expect("dummy hash must succeed")
    })
}

/// The outcome of a login attempt once credentials have checked out.
/// Distinguishes "tokens issued" from "an MFA challenge was just issued
/// and must be verified before tokens are issued" so the handler layer can
/// shape its HTTP response without re-deriving the decision.
pub enum LoginOutcome {
    Tokens { tokens: TokenPair, session: Session, identity: IdentitySummary },
    MfaChallenge { challenge_id: Uuid, method_hint: String },
}

pub struct IdentityService {
    identities: IdentityRepository,
    sessions: SessionRepository,
    handles: HandleService,
    /// Direct repository handle used only for `register`'s transactional
    /// handle insert (spec.md §4.9) — `HandleService` itself has no
    /// transaction-composing entrypoint, since every other caller inserts
    /// handles standalone.
    handle_repo: HandleRepository,
    mfa: MfaService,
    oauth: OAuthService,
    sync: SyncService,
    password_hasher: PasswordHasher,
    redis: RedisClient,
    lockout: LockoutConfig,
    session_ttl: ChronoDuration,
}

impl IdentityService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identities: IdentityRepository,
        sessions: SessionRepository,
        handles: HandleService,
        handle_repo: HandleRepository,
        mfa: MfaService,
        oauth: OAuthService,
        sync: SyncService,
        password_hasher: PasswordHasher,
        redis: RedisClient,
        lockout: LockoutConfig,
    ) -> Self {
        Self {
            identities,
            sessions,
            handles,
            handle_repo,
            mfa,
            oauth,
            sync,
            password_hasher,
            redis,
            lockout,
            session_ttl: ChronoDuration::days(30),
        }
    }

    pub fn with_session_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Registers a new identity (spec.md §4.9 "Registration"): validates
    /// the requested handle through C4's content policy, hashes the
    /// password with Argon2id, and commits the identity + handle rows plus
    /// an outbox sync job in a single transaction.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        handle: &str,
    ) -> Result<IdentitySummary, ApiError> {
        let email = email.trim().to_lowercase();

        PasswordValidator::validate(password).map_err(password_policy_error)?;

        let check = self.handles.check(handle).await?;
        if !check.available {
            if let Some(rejection) = check.rejection {
                return Err(ApiError::from(rejection));
            }
            return Err(ApiError::Taken);
        }

        let password_hash = self.password_hasher.hash(password)?;

        let identity_id = Uuid::new_v4();

        let mut tx = self.identities.pool().begin().await.map_err(|e| {
            ApiError::InternalError { message: format!("failed to begin registration transaction: {e}") }
        })?;

        let new_handle = NewHandle {
            handle: handle.to_string(),
            handle_lower: handle.to_lowercase(),
            owner_identity_id: identity_id,
        };
        let handle_row = self.handle_repo.insert_active(&mut *tx, &new_handle).await?;

        let identity = self
            .identities
            .insert(
                &mut *tx,
                identity_id,
                &NewIdentity {
                    email: email.clone(),
                    phone: None,
                    handle_id: handle_row.handle_id,
                    password_hash,
                },
            )
            .await?;

        self.sync
            .enqueue(
                &mut tx,
                NewSyncJob {
                    entity_type: "identity".to_string(),
                    entity_id: identity.identity_id,
                    source_platform: "identity-service".to_string(),
                    target_platforms: vec!["eid-directory".to_string()],
                    payload: serde_json::json!({
                        "identity_id": identity.identity_id,
                        "handle": handle_row.handle,
                        "email": identity.email,
                    }),
                    delta: None,
                    scheduled_at: None,
                    depends_on: Vec::new(),
                    priority: SyncPriority::Normal,
                    conflict_resolution: ConflictResolution::SourceWins,
                    rollback_data: None,
                    max_attempts: None,
                    parent_job_id: None,
                },
            )
            .await?;

        tx.commit().await.map_err(|e| {
            ApiError::InternalError { message: format!("failed to commit registration transaction: {e}") }
        })?;

        info!(identity_id = %identity.identity_id, "identity registered");
        Ok(IdentitySummary::from(&identity))
    }

    /// Authenticates an email/password pair, enforces lockout and the MFA
    /// policy gate, and — when no further challenge is needed — mints a
    /// token pair and records a session (spec.md §4.9 "Login").
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client_id: &str,
        scope: &str,
        device_descriptor: Option<String>,
        ip_address: Option<String>,
    ) -> Result<LoginOutcome, ApiError> {
        let email = email.trim().to_lowercase();
        let identity = self.identities.find_by_email(&email).await?;

        let password_ok = match &identity {
            Some(identity) => self.password_hasher.verify(password, &identity.password_hash)?,
            None => {
                let _ = self.password_hasher.verify(password, dummy_hash());
                false
            }
        };

        let identity = identity.ok_or(ApiError::InvalidCredentials)?;

        if identity.is_locked(Utc::now()) {
            return Err(ApiError::AccountLocked { until: identity.locked_until });
        }
        if !identity.is_active() {
            return Err(ApiError::AccountInactive);
        }

        if !password_ok {
            self.identities
                .record_failed_login(
                    identity.identity_id,
                    self.lockout.max_login_attempts as i32,
                    ChronoDuration::seconds(self.lockout.lockout_duration_seconds),
                )
                .await?;
            return Err(ApiError::InvalidCredentials);
        }

        self.identities.reset_failed_logins(identity.identity_id).await?;

        match self.mfa.require(identity.identity_id, ChallengePurpose::Login, identity.last_mfa_at).await? {
            MfaDecision::ChallengeRequired { challenge, method_hint, .. } => {
                return Ok(LoginOutcome::MfaChallenge { challenge_id: challenge.challenge_id, method_hint });
            }
            MfaDecision::Satisfied => {}
        }

        self.finish_login(&identity, client_id, scope, device_descriptor, ip_address).await
    }

    /// Completes a login that was paused on an MFA challenge: verifies the
    /// submitted code, then proceeds exactly as `login` would have past the
    /// policy gate.
    #[instrument(skip(self, code))]
    pub async fn complete_login_mfa(
        &self,
        challenge_id: Uuid,
        code: &str,
        identity_id: Uuid,
        client_id: &str,
        scope: &str,
        device_descriptor: Option<String>,
        ip_address: Option<String>,
    ) -> Result<LoginOutcome, ApiError> {
        self.mfa.verify_challenge(challenge_id, code).await?;
        self.identities.record_mfa_assertion(identity_id, Utc::now()).await?;

        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: "identity".to_string() })?;

        self.finish_login(&identity, client_id, scope, device_descriptor, ip_address).await
    }

    async fn finish_login(
        &self,
        identity: &Identity,
        client_id: &str,
        scope: &str,
        device_descriptor: Option<String>,
        ip_address: Option<String>,
    ) -> Result<LoginOutcome, ApiError> {
        let session = self
            .sessions
            .insert(&NewSession {
                identity_id: identity.identity_id,
                client_id: client_id.to_string(),
                device_descriptor,
                ip_address,
                expires_at: Utc::now() + self.session_ttl,
                mfa_asserted: identity.last_mfa_at.is_some(),
            })
            .await?;

        let context = AuthContext {
            identity_id: identity.identity_id,
            session_id: session.session_id,
            amr: if identity.mfa_enabled { vec!["pwd".to_string(), "otp".to_string()] } else { vec!["pwd".to_string()] },
            acr: if identity.mfa_enabled { "mfa".to_string() } else { "pwd".to_string() },
            device_descriptor: None,
        };

        let tokens = self.oauth.issue_tokens_for_identity(client_id, scope, context).await?;

        info!(identity_id = %identity.identity_id, session_id = %session.session_id, "login succeeded");
        Ok(LoginOutcome::Tokens { tokens, session, identity: IdentitySummary::from(identity) })
    }

    /// Changes a password in place (spec.md §4.9 "Password change"):
    /// requires the current password, optionally an MFA assertion for
    /// privileged accounts, and revokes every other session afterward.
    ///
    /// `mfa_assertion` is `Some((challenge_id, code))` when the caller is
    /// completing a challenge the MFA policy gate already issued on a
    /// prior call. A first call that needs MFA returns
    /// `ApiError::MfaRequired { challenge_id }` without touching the
    /// password; the caller resubmits the same request with that
    /// challenge's code attached.
    #[instrument(skip(self, current_password, new_password, mfa_assertion))]
    pub async fn change_password(
        &self,
        identity_id: Uuid,
        current_password: &str,
        new_password: &str,
        keep_session_id: Uuid,
        revoke_other_sessions: bool,
        mfa_assertion: Option<(Uuid, String)>,
    ) -> Result<(), ApiError> {
        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: "identity".to_string() })?;

        if !self.password_hasher.verify(current_password, &identity.password_hash)? {
            return Err(ApiError::InvalidCredentials);
        }

        PasswordValidator::validate(new_password).map_err(password_policy_error)?;

        match mfa_assertion {
            Some((challenge_id, code)) => {
                self.mfa.verify_challenge(challenge_id, &code).await?;
                self.identities.record_mfa_assertion(identity_id, Utc::now()).await?;
            }
            None => {
                match self.mfa.require(identity_id, ChallengePurpose::PasswordChange, identity.last_mfa_at).await? {
                    MfaDecision::Satisfied => {}
                    MfaDecision::ChallengeRequired { challenge, .. } => {
                        return Err(ApiError::MfaRequired { challenge_id: Some(challenge.challenge_id) });
                    }
                }
            }
        }

        let new_hash = self.password_hasher.hash(new_password)?;
        self.identities.update_password(identity_id, &new_hash, identity.version).await?;

        if revoke_other_sessions {
            let revoked = self.sessions.revoke_all_except(identity_id, keep_session_id).await?;
            for session in revoked {
                self.oauth.revoke_session(session.session_id).await?;
            }
        }

        Ok(())
    }

    /// Issues a password reset token cached in Redis for a single-use,
    /// short-lived window (spec.md §4.9 "Password reset", `reset_token_ttl_seconds`).
    /// Always succeeds from the caller's point of view even when the email
    /// doesn't exist, so the response can't be used to enumerate accounts.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<(Uuid, String)>, ApiError> {
        let email = email.trim().to_lowercase();
        let Some(identity) = self.identities.find_by_email(&email).await? else {
            warn!("password reset requested for unknown email");
            return Ok(None);
        };

        let token = hex_encode(eid_crypto::random_bytes(32));

        self.redis
            .set(
                &format!("password_reset:{token}"),
                &identity.identity_id.to_string(),
                Some(std::time::Duration::from_secs(900)),
            )
            .await?;

        Ok(Some((identity.identity_id, token)))
    }

    /// Consumes a reset token, sets the new password, and revokes every
    /// active session (spec.md §4.9: "reset implies every other session
    /// becomes untrusted").
    #[instrument(skip(self, token, new_password))]
    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let key = format!("password_reset:{token}");
        let Some(identity_id_str) = self.redis.get::<String>(&key).await? else {
            return Err(ApiError::InvalidToken);
        };
        let identity_id: Uuid = identity_id_str.parse().map_err(|_| ApiError::InvalidUuid)?;

        PasswordValidator::validate(new_password).map_err(password_policy_error)?;

        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: "identity".to_string() })?;

        let new_hash = self.password_hasher.hash(new_password)?;
        self.identities.update_password(identity_id, &new_hash, identity.version).await?;
        self.redis.delete(&key).await?;

        let revoked = self.sessions.revoke_all_for_identity(identity_id).await?;
        for session in revoked {
            self.oauth.revoke_session(session.session_id).await?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_sessions(&self, identity_id: Uuid) -> Result<Vec<Session>, ApiError> {
        self.sessions.list_active_by_identity(identity_id).await
    }

    #[instrument(skip(self))]
    pub async fn revoke_session(&self, identity_id: Uuid, session_id: Uuid) -> Result<(), ApiError> {
        let session = self
            .sessions
            .revoke(session_id, identity_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: "session".to_string() })?;
        self.oauth.revoke_session(session.session_id).await?;
        Ok(())
    }

    /// Flips `mfa_enabled` once an MFA method is confirmed (spec.md §4.5 →
    /// §4.9 integration: enrollment lives in C5, the flag lives here).
    #[instrument(skip(self))]
    pub async fn mark_mfa_enabled(&self, identity_id: Uuid) -> Result<(), ApiError> {
        self.identities.set_mfa_enabled(identity_id, true).await
    }

    #[instrument(skip(self))]
    pub async fn get_identity(&self, identity_id: Uuid) -> Result<IdentitySummary, ApiError> {
        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .ok_or_else(|| ApiError::NotFound { resource: "identity".to_string() })?;
        Ok(IdentitySummary::from(&identity))
    }

    /// Deactivates an identity: soft-deletes the row and revokes every
    /// session (spec.md §4.9 "Deactivation"). The identity's handle is left
    /// intact for C4's own release/reservation lifecycle.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, identity_id: Uuid) -> Result<(), ApiError> {
        self.identities.soft_delete(identity_id).await?;
        let revoked = self.sessions.revoke_all_for_identity(identity_id).await?;
        for session in revoked {
            self.oauth.revoke_session(session.session_id).await?;
        }
        Ok(())
    }

    /// Write-through applied when verification-engine approves or rejects
    /// a request for this identity (spec.md §4.9 integration with §4.7).
    #[instrument(skip(self))]
    pub async fn apply_verification_outcome(
        &self,
        identity_id: Uuid,
        verification_status: &str,
        badge: Option<&str>,
    ) -> Result<(), ApiError> {
        self.identities.apply_verification_result(identity_id, verification_status, badge).await
    }
}

fn password_policy_error(reasons: Vec<&'static str>) -> ApiError {
    let mut errors = validator::ValidationErrors::new();
    let mut err = validator::ValidationError::new("password_policy");
    err.message = Some(reasons.join("; ").into());
    errors.add("password", err);
    ApiError::ValidationError(errors)
}

fn hex_encode(bytes: Vec<u8>) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl From<handle_engine::domain::HandleRejection> for ApiError {
    fn from(rejection: handle_engine::domain::HandleRejection) -> Self {
        use handle_engine::domain::HandleRejection;
        match rejection {
            HandleRejection::InvalidFormat => ApiError::InvalidFormat,
            HandleRejection::Taken => ApiError::Taken,
            HandleRejection::Reserved { reservation_class } => ApiError::Reserved { reservation_class },
            HandleRejection::SimilarToProtected { entity_name, score, .. } => {
                ApiError::SimilarToProtected { entry: entity_name, score }
            }
            HandleRejection::Inappropriate => ApiError::Inappropriate,
        }
    }
}

impl IdentityStatus {
    pub fn as_verification_status(&self) -> &'static str {
        match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Suspended => "suspended",
            IdentityStatus::Deactivated => "deactivated",
            IdentityStatus::PendingVerification => "pending_verification",
            IdentityStatus::PendingDeletion => "pending_deletion",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_hash_is_stable_across_calls() {
        assert_eq!(dummy_hash(), dummy_hash());
    }

    #[test]
    fn hex_encode_produces_even_length_lowercase() {
        let encoded = hex_encode(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(encoded, "deadbeef");
    }
}
