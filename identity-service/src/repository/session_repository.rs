//! # Session Repository
//!
//! PostgreSQL-based repository for the `sessions` table (spec.md §3, §6
//! `/auth/sessions`). Owned entirely by this crate — no other component
//! references a session row, only its `session_id` as an opaque claim.

use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

use shared::errors::ApiError;

use crate::domain::{NewSession, Session};

const SELECT_COLUMNS: &str = "session_id, identity_id, client_id, device_descriptor, ip_address, \
     created_at, last_active_at, expires_at, is_active, mfa_asserted, mfa_asserted_at";

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, new_session))]
    pub async fn insert(&self, new_session: &NewSession) -> Result<Session, ApiError> {
        let mfa_asserted_at = new_session.mfa_asserted.then(Utc::now);
        sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (
                session_id, identity_id, client_id, device_descriptor, ip_address,
                created_at, last_active_at, expires_at, is_active, mfa_asserted, mfa_asserted_at
            )
            VALUES ($1, $2, $3, $4, $5, now(), now(), $6, true, $7, $8)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_session.identity_id)
        .bind(&new_session.client_id)
        .bind(&new_session.device_descriptor)
        .bind(&new_session.ip_address)
        .bind(new_session.expires_at)
        .bind(new_session.mfa_asserted)
        .bind(mfa_asserted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert session");
            ApiError::InternalError { message: "failed to create session".to_string() }
        })
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, session_id: Uuid) -> Result<Option<Session>, ApiError> {
        sqlx::query_as::<_, Session>(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up session");
            ApiError::InternalError { message: "failed to look up session".to_string() }
        })
    }

    #[instrument(skip(self))]
    pub async fn list_active_by_identity(&self, identity_id: Uuid) -> Result<Vec<Session>, ApiError> {
        sqlx::query_as::<_, Session>(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions \
             WHERE identity_id = $1 AND is_active = true AND expires_at > now() \
             ORDER BY last_active_at DESC"
        ))
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list sessions");
            ApiError::InternalError { message: "failed to list sessions".to_string() }
        })
    }

    #[instrument(skip(self))]
    pub async fn touch(&self, session_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE sessions SET last_active_at = now() WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to touch session");
                ApiError::InternalError { message: "failed to update session".to_string() }
            })?;
        Ok(())
    }

    /// Revokes a single session, scoped to its owner so one identity cannot
    /// revoke another's session by guessing an id (spec.md §6
    /// `DELETE /auth/sessions/{id}`).
    #[instrument(skip(self))]
    pub async fn revoke(&self, session_id: Uuid, identity_id: Uuid) -> Result<Option<Session>, ApiError> {
        sqlx::query_as::<_, Session>(&format!(
            r#"
            UPDATE sessions SET is_active = false
            WHERE session_id = $1 AND identity_id = $2 AND is_active = true
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to revoke session");
            ApiError::InternalError { message: "failed to revoke session".to_string() }
        })
    }

    /// Revokes every active session for an identity — called on password
    /// reset confirmation and on explicit "log out everywhere" (spec.md
    /// §4.9). Returns the revoked rows so the caller can cascade token
    /// revocation per session.
    #[instrument(skip(self))]
    pub async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<Vec<Session>, ApiError> {
        sqlx::query_as::<_, Session>(&format!(
            r#"
            UPDATE sessions SET is_active = false
            WHERE identity_id = $1 AND is_active = true
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to revoke all sessions");
            ApiError::InternalError { message: "failed to revoke sessions".to_string() }
        })
    }

    /// Revokes every other active session for an identity, keeping one
    /// (spec.md §4.9 "optionally revoke other sessions" on password
    /// change). Returns the revoked rows so the caller can cascade token
    /// revocation per session.
    #[instrument(skip(self))]
    pub async fn revoke_all_except(&self, identity_id: Uuid, keep_session_id: Uuid) -> Result<Vec<Session>, ApiError> {
        sqlx::query_as::<_, Session>(&format!(
            r#"
            UPDATE sessions SET is_active = false
            WHERE identity_id = $1 AND is_active = true AND session_id != $2
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(identity_id)
        .bind(keep_session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to revoke other sessions");
            ApiError::InternalError { message: "failed to revoke sessions".to_string() }
        })
    }
}
