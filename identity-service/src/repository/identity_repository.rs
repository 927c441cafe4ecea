//! # Identity Repository
//!
//! PostgreSQL-based repository for the `identities` table. `insert` takes
//! `impl PgExecutor` (following handle-engine's `insert_active` pattern) so
//! registration can compose the identity insert into the same transaction
//! as the handle and profile rows (spec.md §4.9).

use sqlx::{PgExecutor, PgPool};
use tracing::{error, instrument};
use uuid::Uuid;

use shared::errors::ApiError;

use crate::domain::{Identity, NewIdentity};

const SELECT_COLUMNS: &str = "identity_id, email, phone, handle_id, password_hash, status, \
     verification_status, verification_badge, reputation_score, failed_login_attempts, \
     locked_until, password_changed_at, mfa_enabled, last_mfa_at, version, \
     created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct IdentityRepository {
    pool: PgPool,
}

impl IdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Looks up an identity by normalized email. Used by login's
    /// timing-uniform lookup (spec.md §4.9) — callers must still run a
    /// dummy password verification on `None` to avoid an enumeration
    /// timing oracle.
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, ApiError> {
        sqlx::query_as::<_, Identity>(&format!(
            "SELECT {SELECT_COLUMNS} FROM identities WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up identity by email");
            ApiError::InternalError { message: "failed to look up identity".to_string() }
        })
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, ApiError> {
        sqlx::query_as::<_, Identity>(&format!(
            "SELECT {SELECT_COLUMNS} FROM identities WHERE identity_id = $1 AND deleted_at IS NULL"
        ))
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up identity by id");
            ApiError::InternalError { message: "failed to look up identity".to_string() }
        })
    }

    /// Inserts a new identity row under a caller-supplied id. Takes a
    /// generic executor so registration can run it inside the same
    /// transaction as the handle and profile inserts, and takes an
    /// explicit `identity_id` because the handle row referencing this
    /// identity as its owner must be inserted first in the same
    /// transaction (spec.md §4.9).
    #[instrument(skip(self, executor, new_identity))]
    pub async fn insert<'e, E>(
        &self,
        executor: E,
        identity_id: Uuid,
        new_identity: &NewIdentity,
    ) -> Result<Identity, ApiError>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Identity>(&format!(
            r#"
            INSERT INTO identities (
                identity_id, email, phone, handle_id, password_hash, status,
                verification_status, reputation_score, failed_login_attempts,
                password_changed_at, mfa_enabled, version
            )
            VALUES ($1, $2, $3, $4, $5, 'active', 'unverified', 0, 0, now(), false, 0)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(identity_id)
        .bind(&new_identity.email)
        .bind(&new_identity.phone)
        .bind(new_identity.handle_id)
        .bind(&new_identity.password_hash)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert identity");
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return ApiError::Conflict { resource: "email already registered".to_string() };
                }
            }
            ApiError::InternalError { message: "failed to insert identity".to_string() }
        })
    }

    /// Atomically increments the failed-login counter and, once the
    /// threshold is reached, sets `locked_until` (spec.md §4.9's lockout
    /// policy, default 5 attempts / 30 minutes — see `shared::LockoutConfig`).
    #[instrument(skip(self))]
    pub async fn record_failed_login(
        &self,
        identity_id: Uuid,
        threshold: i32,
        lockout_duration: chrono::Duration,
    ) -> Result<Identity, ApiError> {
        sqlx::query_as::<_, Identity>(&format!(
            r#"
            UPDATE identities
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN now() + $3 * interval '1 second'
                    ELSE locked_until
                END,
                version = version + 1,
                updated_at = now()
            WHERE identity_id = $1
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(identity_id)
        .bind(threshold)
        .bind(lockout_duration.num_seconds() as f64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to record failed login");
            ApiError::InternalError { message: "failed to update identity".to_string() }
        })
    }

    /// Resets the failed-login counter and lockout on a successful login.
    #[instrument(skip(self))]
    pub async fn reset_failed_logins(&self, identity_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE identities SET failed_login_attempts = 0, locked_until = NULL, \
             version = version + 1, updated_at = now() WHERE identity_id = $1",
        )
        .bind(identity_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to reset failed logins");
            ApiError::InternalError { message: "failed to update identity".to_string() }
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn record_mfa_assertion(&self, identity_id: Uuid, at: chrono::DateTime<chrono::Utc>) -> Result<(), ApiError> {
        sqlx::query("UPDATE identities SET last_mfa_at = $1, updated_at = now() WHERE identity_id = $2")
            .bind(at)
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to record mfa assertion");
                ApiError::InternalError { message: "failed to update identity".to_string() }
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_mfa_enabled(&self, identity_id: Uuid, enabled: bool) -> Result<(), ApiError> {
        sqlx::query("UPDATE identities SET mfa_enabled = $1, updated_at = now() WHERE identity_id = $2")
            .bind(enabled)
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to set mfa_enabled");
                ApiError::InternalError { message: "failed to update identity".to_string() }
            })?;
        Ok(())
    }

    /// Version-guarded password update. Used by both change-password and
    /// reset-confirm (spec.md §4.9); the caller is responsible for
    /// revoking sessions/tokens afterward.
    #[instrument(skip(self, new_password_hash))]
    pub async fn update_password(
        &self,
        identity_id: Uuid,
        new_password_hash: &str,
        expected_version: i64,
    ) -> Result<Identity, ApiError> {
        sqlx::query_as::<_, Identity>(&format!(
            r#"
            UPDATE identities
            SET password_hash = $1, password_changed_at = now(), version = version + 1, updated_at = now()
            WHERE identity_id = $2 AND version = $3
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(new_password_hash)
        .bind(identity_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to update password");
            ApiError::InternalError { message: "failed to update identity".to_string() }
        })?
        .ok_or_else(|| ApiError::Conflict { resource: "identity was modified concurrently".to_string() })
    }

    /// Marks an identity `pending_deletion` rather than deleting the row
    /// (spec.md §4.9 "Deactivation" — soft delete so handle/profile history
    /// and audit trails remain intact).
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, identity_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE identities SET status = 'pending_deletion', deleted_at = now(), \
             version = version + 1, updated_at = now() WHERE identity_id = $1",
        )
        .bind(identity_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to soft-delete identity");
            ApiError::InternalError { message: "failed to update identity".to_string() }
        })?;
        Ok(())
    }

    /// Write-through from a verification approval (spec.md §4.7 →
    /// §4.9 integration: the façade subscribes to verification outcomes and
    /// updates the identity's badge/status accordingly).
    #[instrument(skip(self))]
    pub async fn apply_verification_result(
        &self,
        identity_id: Uuid,
        verification_status: &str,
        badge: Option<&str>,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE identities SET verification_status = $1, verification_badge = $2, \
             version = version + 1, updated_at = now() WHERE identity_id = $3",
        )
        .bind(verification_status)
        .bind(badge)
        .bind(identity_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to apply verification result");
            ApiError::InternalError { message: "failed to update identity".to_string() }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_columns_matches_identity_struct_field_count() {
        let count = SELECT_COLUMNS.split(',').count();
        assert_eq!(count, 18);
    }
}
