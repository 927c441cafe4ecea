//! # OAuth Repository
//!
//! PostgreSQL-based repository for clients, authorization codes, access
//! tokens, and refresh tokens (spec.md §3, §4.6).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

use shared::errors::ApiError;

use crate::domain::{AccessTokenRecord, AuthorizationCode, OAuthClient, RefreshTokenRecord};

#[derive(Clone)]
pub struct OAuthRepository {
    pool: PgPool,
}

impl OAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, ApiError> {
        sqlx::query_as::<_, OAuthClient>(
            r#"
            SELECT client_id, client_secret_hash, client_name, redirect_uris,
                   allowed_scopes, allowed_grant_types, is_trusted, is_active, created_at
            FROM oauth_clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up oauth client");
            ApiError::InternalError {
                message: "failed to look up oauth client".to_string(),
            }
        })
    }

    #[instrument(skip(self, code))]
    pub async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_authorization_codes
                (code_id, code_hash, client_id, identity_id, redirect_uri, scope,
                 code_challenge, code_challenge_method, session_id, expires_at, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL, $11)
            "#,
        )
        .bind(code.code_id)
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(code.identity_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.code_challenge)
        .bind(code.code_challenge_method)
        .bind(code.session_id)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert authorization code");
            ApiError::InternalError {
                message: "failed to insert authorization code".to_string(),
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self, code_hash))]
    pub async fn find_authorization_code_by_hash(
        &self,
        code_hash: &str,
    ) -> Result<Option<AuthorizationCode>, ApiError> {
        sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT code_id, code_hash, client_id, identity_id, redirect_uri, scope,
                   code_challenge, code_challenge_method, session_id, expires_at, used_at, created_at
            FROM oauth_authorization_codes
            WHERE code_hash = $1
            "#,
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up authorization code");
            ApiError::InternalError {
                message: "failed to look up authorization code".to_string(),
            }
        })
    }

    /// Marks a code used, guarded so a concurrent second exchange never
    /// succeeds twice (spec.md §4.6: codes have `max_uses = 1`).
    #[instrument(skip(self))]
    pub async fn mark_code_used(&self, code_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "UPDATE oauth_authorization_codes SET used_at = now() WHERE code_id = $1 AND used_at IS NULL",
        )
        .bind(code_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to mark authorization code used");
            ApiError::InternalError {
                message: "failed to mark authorization code used".to_string(),
            }
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, token))]
    pub async fn insert_access_token(&self, token: &AccessTokenRecord) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_access_tokens
                (access_token_id, jti_hash, identity_id, client_id, session_id, scope,
                 status, use_count, issued_at, expires_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL)
            "#,
        )
        .bind(token.access_token_id)
        .bind(&token.jti_hash)
        .bind(token.identity_id)
        .bind(&token.client_id)
        .bind(token.session_id)
        .bind(&token.scope)
        .bind(token.status)
        .bind(token.use_count)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert access token record");
            ApiError::InternalError {
                message: "failed to insert access token record".to_string(),
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self, jti_hash))]
    pub async fn find_access_token_by_hash(
        &self,
        jti_hash: &str,
    ) -> Result<Option<AccessTokenRecord>, ApiError> {
        sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            SELECT access_token_id, jti_hash, identity_id, client_id, session_id, scope,
                   status, use_count, issued_at, expires_at, last_used_at
            FROM oauth_access_tokens
            WHERE jti_hash = $1
            "#,
        )
        .bind(jti_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up access token record");
            ApiError::InternalError {
                message: "failed to look up access token record".to_string(),
            }
        })
    }

    /// Lists the `jti_hash` of every access token bound to a session, so a
    /// caller revoking at the session/family level can also invalidate each
    /// one's entry in the Redis validation cache (spec.md §4.6: "any
    /// revocation must invalidate this cache entry").
    #[instrument(skip(self))]
    pub async fn list_access_token_hashes_by_session(&self, session_id: Uuid) -> Result<Vec<String>, ApiError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT jti_hash FROM oauth_access_tokens WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list access token hashes for session");
            ApiError::InternalError {
                message: "failed to list access token hashes for session".to_string(),
            }
        })?;

        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    /// Records a successful validation (spec.md §4.6: "increments
    /// `use_count`, updates `last_used_at`").
    #[instrument(skip(self))]
    pub async fn record_access_token_use(&self, access_token_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE oauth_access_tokens SET use_count = use_count + 1, last_used_at = now() WHERE access_token_id = $1",
        )
        .bind(access_token_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to record access token use");
            ApiError::InternalError {
                message: "failed to record access token use".to_string(),
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn revoke_access_token(&self, access_token_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE oauth_access_tokens SET status = 'revoked' WHERE access_token_id = $1")
            .bind(access_token_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to revoke access token");
                ApiError::InternalError {
                    message: "failed to revoke access token".to_string(),
                }
            })?;

        Ok(())
    }

    #[instrument(skip(self, token))]
    pub async fn insert_refresh_token(&self, token: &RefreshTokenRecord) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_refresh_tokens
                (refresh_token_id, token_hash, identity_id, client_id, session_id, scope,
                 token_family, generation, parent_token_id, rotated_to_id, status,
                 device_descriptor, expires_at, created_at, last_used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10, $11, $12, $13, NULL)
            "#,
        )
        .bind(token.refresh_token_id)
        .bind(&token.token_hash)
        .bind(token.identity_id)
        .bind(&token.client_id)
        .bind(token.session_id)
        .bind(&token.scope)
        .bind(token.token_family)
        .bind(token.generation)
        .bind(token.parent_token_id)
        .bind(token.status)
        .bind(&token.device_descriptor)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert refresh token record");
            ApiError::InternalError {
                message: "failed to insert refresh token record".to_string(),
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self, token_hash))]
    pub async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ApiError> {
        sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT refresh_token_id, token_hash, identity_id, client_id, session_id, scope,
                   token_family, generation, parent_token_id, rotated_to_id, status,
                   device_descriptor, expires_at, created_at, last_used_at
            FROM oauth_refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up refresh token record");
            ApiError::InternalError {
                message: "failed to look up refresh token record".to_string(),
            }
        })
    }

    /// Atomically marks a refresh token `used` and links it to its
    /// successor, guarded so a racing reuse can't also win (spec.md §4.6
    /// "Refresh rotation with reuse detection").
    #[instrument(skip(self))]
    pub async fn mark_refresh_token_rotated(
        &self,
        refresh_token_id: Uuid,
        rotated_to_id: Uuid,
    ) -> Result<bool, ApiError> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_refresh_tokens
            SET status = 'used', rotated_to_id = $1, last_used_at = now()
            WHERE refresh_token_id = $2 AND status = 'active'
            "#,
        )
        .bind(rotated_to_id)
        .bind(refresh_token_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to mark refresh token rotated");
            ApiError::InternalError {
                message: "failed to mark refresh token rotated".to_string(),
            }
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes every token (any generation, any status) sharing a family —
    /// the reuse-detection response (spec.md §4.6). Returns the distinct
    /// session ids touched, so the caller can invalidate their access
    /// tokens' Redis validation cache entries.
    #[instrument(skip(self))]
    pub async fn revoke_refresh_token_family(&self, token_family: Uuid) -> Result<Vec<Uuid>, ApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin family revocation transaction");
            ApiError::InternalError {
                message: "failed to begin transaction".to_string(),
            }
        })?;

        let sessions: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT session_id FROM oauth_refresh_tokens WHERE token_family = $1",
        )
        .bind(token_family)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list sessions for family revocation");
            ApiError::InternalError {
                message: "failed to list sessions for family revocation".to_string(),
            }
        })?;

        sqlx::query("UPDATE oauth_refresh_tokens SET status = 'revoked' WHERE token_family = $1")
            .bind(token_family)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to revoke refresh token family");
                ApiError::InternalError {
                    message: "failed to revoke refresh token family".to_string(),
                }
            })?;

        sqlx::query(
            r#"
            UPDATE oauth_access_tokens
            SET status = 'revoked'
            WHERE session_id IN (
                SELECT session_id FROM oauth_refresh_tokens WHERE token_family = $1
            )
            "#,
        )
        .bind(token_family)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to revoke access tokens for family");
            ApiError::InternalError {
                message: "failed to revoke access tokens for family".to_string(),
            }
        })?;

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit family revocation transaction");
            ApiError::InternalError {
                message: "failed to commit transaction".to_string(),
            }
        })?;

        Ok(sessions.into_iter().map(|(s,)| s).collect())
    }

    /// Revokes every access and refresh token bound to a session
    /// (spec.md §4.6 `revoke_session`).
    #[instrument(skip(self))]
    pub async fn revoke_session_tokens(&self, session_id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin session revocation transaction");
            ApiError::InternalError {
                message: "failed to begin transaction".to_string(),
            }
        })?;

        sqlx::query("UPDATE oauth_access_tokens SET status = 'revoked' WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to revoke session access tokens");
                ApiError::InternalError {
                    message: "failed to revoke session access tokens".to_string(),
                }
            })?;

        sqlx::query("UPDATE oauth_refresh_tokens SET status = 'revoked' WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to revoke session refresh tokens");
                ApiError::InternalError {
                    message: "failed to revoke session refresh tokens".to_string(),
                }
            })?;

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit session revocation transaction");
            ApiError::InternalError {
                message: "failed to commit transaction".to_string(),
            }
        })
    }

    /// Deletes expired, unused authorization codes. Called opportunistically;
    /// expiry is also enforced at read time via [`AuthorizationCode::is_usable`].
    #[instrument(skip(self))]
    pub async fn purge_expired_codes(&self, before: DateTime<Utc>) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM oauth_authorization_codes WHERE expires_at < $1 AND used_at IS NULL")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to purge expired authorization codes");
                ApiError::InternalError {
                    message: "failed to purge expired authorization codes".to_string(),
                }
            })?;

        Ok(result.rows_affected())
    }

    /// Flips the status column for rows whose `expires_at` has lapsed but
    /// remain `active`, so `TokenStatus` stays the source of truth rather
    /// than every caller re-deriving expiry from `expires_at`.
    #[instrument(skip(self))]
    pub async fn sweep_expired_refresh_tokens(&self) -> Result<u64, ApiError> {
        let result = sqlx::query(
            "UPDATE oauth_refresh_tokens SET status = 'expired' WHERE status = 'active' AND expires_at < now()",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to sweep expired refresh tokens");
            ApiError::InternalError {
                message: "failed to sweep expired refresh tokens".to_string(),
            }
        })?;

        Ok(result.rows_affected())
    }
}
