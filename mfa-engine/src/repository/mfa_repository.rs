//! # MFA Repository
//!
//! PostgreSQL-based repository for MFA methods, challenges, and backup
//! codes (spec.md §3, §4.5).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

use shared::errors::ApiError;

use crate::domain::{BackupCode, ChallengePurpose, MfaChallenge, MfaMethod, MfaMethodType};

#[derive(Clone)]
pub struct MfaRepository {
    pool: PgPool,
}

impl MfaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_method(&self, method_id: Uuid) -> Result<Option<MfaMethod>, ApiError> {
        sqlx::query_as::<_, MfaMethod>(
            r#"
            SELECT method_id, identity_id, method_type, identifier, secret_ciphertext,
                   is_primary, is_verified, priority, trust_level, failed_counter,
                   locked_until, created_at, updated_at
            FROM mfa_methods
            WHERE method_id = $1
            "#,
        )
        .bind(method_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up mfa method");
            ApiError::InternalError {
                message: "failed to look up mfa method".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn list_methods(&self, identity_id: Uuid) -> Result<Vec<MfaMethod>, ApiError> {
        sqlx::query_as::<_, MfaMethod>(
            r#"
            SELECT method_id, identity_id, method_type, identifier, secret_ciphertext,
                   is_primary, is_verified, priority, trust_level, failed_counter,
                   locked_until, created_at, updated_at
            FROM mfa_methods
            WHERE identity_id = $1
            ORDER BY priority ASC
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list mfa methods");
            ApiError::InternalError {
                message: "failed to list mfa methods".to_string(),
            }
        })
    }

    /// Inserts a newly enrolling (unverified) method.
    #[instrument(skip(self, secret_ciphertext))]
    pub async fn insert_method(
        &self,
        identity_id: Uuid,
        method_type: MfaMethodType,
        identifier: &str,
        secret_ciphertext: Option<&str>,
        priority: i16,
    ) -> Result<MfaMethod, ApiError> {
        sqlx::query_as::<_, MfaMethod>(
            r#"
            INSERT INTO mfa_methods
                (method_id, identity_id, method_type, identifier, secret_ciphertext,
                 is_primary, is_verified, priority, trust_level, failed_counter)
            VALUES ($1, $2, $3, $4, $5, false, false, $6, 1, 0)
            RETURNING method_id, identity_id, method_type, identifier, secret_ciphertext,
                      is_primary, is_verified, priority, trust_level, failed_counter,
                      locked_until, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(identity_id)
        .bind(method_type)
        .bind(identifier)
        .bind(secret_ciphertext)
        .bind(priority)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert mfa method");
            ApiError::InternalError {
                message: "failed to insert mfa method".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_verified(&self, method_id: Uuid) -> Result<MfaMethod, ApiError> {
        sqlx::query_as::<_, MfaMethod>(
            r#"
            UPDATE mfa_methods
            SET is_verified = true, updated_at = now()
            WHERE method_id = $1
            RETURNING method_id, identity_id, method_type, identifier, secret_ciphertext,
                      is_primary, is_verified, priority, trust_level, failed_counter,
                      locked_until, created_at, updated_at
            "#,
        )
        .bind(method_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to mark mfa method verified");
            ApiError::InternalError {
                message: "failed to mark mfa method verified".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("mfa_method:{method_id}"),
        })
    }

    /// Increments `failed_counter` and, if it has now reached `max_failed`,
    /// locks the method until `now + cooldown` (spec.md §4.5's lockout rule).
    #[instrument(skip(self))]
    pub async fn register_failure(
        &self,
        method_id: Uuid,
        max_failed: i32,
        cooldown: chrono::Duration,
    ) -> Result<MfaMethod, ApiError> {
        sqlx::query_as::<_, MfaMethod>(
            r#"
            UPDATE mfa_methods
            SET failed_counter = failed_counter + 1,
                locked_until = CASE
                    WHEN failed_counter + 1 >= $2 THEN now() + ($3 * interval '1 second')
                    ELSE locked_until
                END,
                updated_at = now()
            WHERE method_id = $1
            RETURNING method_id, identity_id, method_type, identifier, secret_ciphertext,
                      is_primary, is_verified, priority, trust_level, failed_counter,
                      locked_until, created_at, updated_at
            "#,
        )
        .bind(method_id)
        .bind(max_failed)
        .bind(cooldown.num_seconds())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to register mfa failure");
            ApiError::InternalError {
                message: "failed to register mfa failure".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("mfa_method:{method_id}"),
        })
    }

    #[instrument(skip(self))]
    pub async fn reset_failures(&self, method_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE mfa_methods SET failed_counter = 0, locked_until = NULL, updated_at = now() WHERE method_id = $1")
            .bind(method_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to reset mfa failures");
                ApiError::InternalError {
                    message: "failed to reset mfa failures".to_string(),
                }
            })?;
        Ok(())
    }

    #[instrument(skip(self, code_hash))]
    pub async fn insert_challenge(
        &self,
        identity_id: Uuid,
        method_id: Uuid,
        purpose: ChallengePurpose,
        code_hash: Option<&str>,
        expires_at: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<MfaChallenge, ApiError> {
        sqlx::query_as::<_, MfaChallenge>(
            r#"
            INSERT INTO mfa_challenges
                (challenge_id, identity_id, method_id, purpose, code_hash,
                 issued_at, expires_at, attempts, max_attempts, status)
            VALUES ($1, $2, $3, $4, $5, now(), $6, 0, $7, 'pending')
            RETURNING challenge_id, identity_id, method_id, purpose, code_hash,
                      issued_at, expires_at, attempts, max_attempts, status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(identity_id)
        .bind(method_id)
        .bind(purpose)
        .bind(code_hash)
        .bind(expires_at)
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert mfa challenge");
            ApiError::InternalError {
                message: "failed to insert mfa challenge".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn find_challenge(&self, challenge_id: Uuid) -> Result<Option<MfaChallenge>, ApiError> {
        sqlx::query_as::<_, MfaChallenge>(
            r#"
            SELECT challenge_id, identity_id, method_id, purpose, code_hash,
                   issued_at, expires_at, attempts, max_attempts, status
            FROM mfa_challenges
            WHERE challenge_id = $1
            "#,
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up mfa challenge");
            ApiError::InternalError {
                message: "failed to look up mfa challenge".to_string(),
            }
        })
    }

    /// Atomically increments `attempts` and marks the challenge `failed` if
    /// that reaches `max_attempts`. Guarded on `status = 'pending'` so a
    /// concurrent success can't be clobbered by a stale retry.
    #[instrument(skip(self))]
    pub async fn record_attempt_failure(&self, challenge_id: Uuid) -> Result<MfaChallenge, ApiError> {
        sqlx::query_as::<_, MfaChallenge>(
            r#"
            UPDATE mfa_challenges
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE status END
            WHERE challenge_id = $1 AND status = 'pending'
            RETURNING challenge_id, identity_id, method_id, purpose, code_hash,
                      issued_at, expires_at, attempts, max_attempts, status
            "#,
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to record mfa challenge failure");
            ApiError::InternalError {
                message: "failed to record mfa challenge failure".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::NotFound {
            resource: format!("mfa_challenge:{challenge_id}"),
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_consumed(&self, challenge_id: Uuid) -> Result<MfaChallenge, ApiError> {
        sqlx::query_as::<_, MfaChallenge>(
            r#"
            UPDATE mfa_challenges
            SET status = 'consumed'
            WHERE challenge_id = $1 AND status = 'pending'
            RETURNING challenge_id, identity_id, method_id, purpose, code_hash,
                      issued_at, expires_at, attempts, max_attempts, status
            "#,
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to consume mfa challenge");
            ApiError::InternalError {
                message: "failed to consume mfa challenge".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "mfa challenge is no longer pending".to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_expired(&self, challenge_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE mfa_challenges SET status = 'expired' WHERE challenge_id = $1 AND status = 'pending'")
            .bind(challenge_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to expire mfa challenge");
                ApiError::InternalError {
                    message: "failed to expire mfa challenge".to_string(),
                }
            })?;
        Ok(())
    }

    /// Inserts `n` hashed backup codes for a method in one transaction.
    #[instrument(skip(self, code_hashes))]
    pub async fn insert_backup_codes(&self, method_id: Uuid, code_hashes: &[String]) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin backup code transaction");
            ApiError::InternalError {
                message: "failed to begin transaction".to_string(),
            }
        })?;

        for hash in code_hashes {
            sqlx::query(
                "INSERT INTO backup_codes (backup_code_id, method_id, code_hash) VALUES ($1, $2, $3)",
            )
            .bind(Uuid::new_v4())
            .bind(method_id)
            .bind(hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to insert backup code");
                ApiError::InternalError {
                    message: "failed to insert backup code".to_string(),
                }
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit backup code transaction");
            ApiError::InternalError {
                message: "failed to commit transaction".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn find_unused_backup_codes(&self, method_id: Uuid) -> Result<Vec<BackupCode>, ApiError> {
        sqlx::query_as::<_, BackupCode>(
            "SELECT backup_code_id, method_id, code_hash, used_at \
             FROM backup_codes WHERE method_id = $1 AND used_at IS NULL",
        )
        .bind(method_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list unused backup codes");
            ApiError::InternalError {
                message: "failed to list unused backup codes".to_string(),
            }
        })
    }

    /// Marks one backup code used, guarded on it still being unused so two
    /// concurrent verifications can't both consume the same code.
    #[instrument(skip(self))]
    pub async fn mark_backup_code_used(&self, backup_code_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "UPDATE backup_codes SET used_at = now() WHERE backup_code_id = $1 AND used_at IS NULL",
        )
        .bind(backup_code_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to mark backup code used");
            ApiError::InternalError {
                message: "failed to mark backup code used".to_string(),
            }
        })?;
        Ok(result.rows_affected() == 1)
    }
}
