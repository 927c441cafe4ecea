//! # Handle Repository
//!
//! PostgreSQL-based repository for handle, reservation, protection, and
//! transfer state (spec.md §3, §4.4).
//!
//! Most methods take `&PgPool` and manage their own transaction scope
//! internally, following the teacher's pattern. `insert_active` instead
//! takes `impl PgExecutor` so the identity façade (C9) can compose a handle
//! insert into its own registration transaction alongside the identity and
//! profile rows (spec.md §4.9's `Registration` operation) without this
//! crate owning that transaction.

use sqlx::{PgExecutor, PgPool};
use tracing::{error, instrument};
use uuid::Uuid;

use shared::errors::ApiError;

use crate::domain::{Handle, HandleTransfer, NewHandle, ProtectedEntry, ReservedHandle};

#[derive(Clone)]
pub struct HandleRepository {
    pool: PgPool,
}

impl HandleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds the active handle row for a folded handle, if any.
    #[instrument(skip(self))]
    pub async fn find_active_by_lower(&self, handle_lower: &str) -> Result<Option<Handle>, ApiError> {
        sqlx::query_as::<_, Handle>(
            r#"
            SELECT handle_id, handle, handle_lower, owner_identity_id, status,
                   reservation_class, is_protected, original_owner_id,
                   transfer_token_hash, transfer_expires_at, version,
                   created_at, updated_at
            FROM handles
            WHERE handle_lower = $1 AND status = 'active'
            "#,
        )
        .bind(handle_lower)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up handle by lower");
            ApiError::InternalError {
                message: "failed to look up handle".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, handle_id: Uuid) -> Result<Option<Handle>, ApiError> {
        sqlx::query_as::<_, Handle>(
            r#"
            SELECT handle_id, handle, handle_lower, owner_identity_id, status,
                   reservation_class, is_protected, original_owner_id,
                   transfer_token_hash, transfer_expires_at, version,
                   created_at, updated_at
            FROM handles
            WHERE handle_id = $1
            "#,
        )
        .bind(handle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up handle by id");
            ApiError::InternalError {
                message: "failed to look up handle".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn find_reserved(&self, handle_lower: &str) -> Result<Option<ReservedHandle>, ApiError> {
        sqlx::query_as::<_, ReservedHandle>(
            "SELECT reserved_handle_id, handle_lower, reservation_class, created_at \
             FROM reserved_handles WHERE handle_lower = $1",
        )
        .bind(handle_lower)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up reserved handle");
            ApiError::InternalError {
                message: "failed to look up reserved handle".to_string(),
            }
        })
    }

    /// Loads every protected entry for similarity scoring. Scored in Rust
    /// (not SQL) since similarity is a non-trivial edit-distance function.
    #[instrument(skip(self))]
    pub async fn list_protected_entries(&self) -> Result<Vec<ProtectedEntry>, ApiError> {
        sqlx::query_as::<_, ProtectedEntry>(
            "SELECT protected_entry_id, name, handle_lower, aliases, tier, \
                    similarity_threshold, claimed_by, claimed_at \
             FROM protected_entries",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list protected entries");
            ApiError::InternalError {
                message: "failed to list protected entries".to_string(),
            }
        })
    }

    pub async fn find_protected_entry(&self, protected_entry_id: Uuid) -> Result<Option<ProtectedEntry>, ApiError> {
        sqlx::query_as::<_, ProtectedEntry>(
            "SELECT protected_entry_id, name, handle_lower, aliases, tier, \
                    similarity_threshold, claimed_by, claimed_at \
             FROM protected_entries WHERE protected_entry_id = $1",
        )
        .bind(protected_entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up protected entry");
            ApiError::InternalError {
                message: "failed to look up protected entry".to_string(),
            }
        })
    }

    /// Inserts a new active handle row. Takes a generic executor so callers
    /// composing a larger transaction (identity registration) can pass a
    /// `&mut Transaction` instead of the pool.
    #[instrument(skip(self, executor))]
    pub async fn insert_active<'e, E>(&self, executor: E, new_handle: &NewHandle) -> Result<Handle, ApiError>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Handle>(
            r#"
            INSERT INTO handles (handle_id, handle, handle_lower, owner_identity_id, status, is_protected, version)
            VALUES ($1, $2, $3, $4, 'active', false, 0)
            RETURNING handle_id, handle, handle_lower, owner_identity_id, status,
                      reservation_class, is_protected, original_owner_id,
                      transfer_token_hash, transfer_expires_at, version,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_handle.handle)
        .bind(&new_handle.handle_lower)
        .bind(new_handle.owner_identity_id)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert handle");
            ApiError::InternalError {
                message: "failed to insert handle".to_string(),
            }
        })
    }

    /// Writes the claim outcome: owner switches to the claimant, status
    /// becomes `active`, and the protected entry's `claimed_by`/`claimed_at`
    /// are set in the same transaction (spec.md §4.4's claim workflow).
    #[instrument(skip(self))]
    pub async fn commit_claim(
        &self,
        handle_id: Uuid,
        protected_entry_id: Uuid,
        claimant_identity_id: Uuid,
        expected_version: i64,
    ) -> Result<Handle, ApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin claim transaction");
            ApiError::InternalError {
                message: "failed to begin transaction".to_string(),
            }
        })?;

        let handle = sqlx::query_as::<_, Handle>(
            r#"
            UPDATE handles
            SET owner_identity_id = $1, status = 'active', version = version + 1, updated_at = now()
            WHERE handle_id = $2 AND version = $3
            RETURNING handle_id, handle, handle_lower, owner_identity_id, status,
                      reservation_class, is_protected, original_owner_id,
                      transfer_token_hash, transfer_expires_at, version,
                      created_at, updated_at
            "#,
        )
        .bind(claimant_identity_id)
        .bind(handle_id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to commit claim");
            ApiError::InternalError {
                message: "failed to commit claim".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "handle was modified concurrently".to_string(),
        })?;

        sqlx::query(
            "UPDATE protected_entries SET claimed_by = $1, claimed_at = now() WHERE protected_entry_id = $2",
        )
        .bind(claimant_identity_id)
        .bind(protected_entry_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to mark protected entry claimed");
            ApiError::InternalError {
                message: "failed to mark protected entry claimed".to_string(),
            }
        })?;

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit claim transaction");
            ApiError::InternalError {
                message: "failed to commit transaction".to_string(),
            }
        })?;

        Ok(handle)
    }

    /// Begins a transfer: writes `status = transferring` and the hashed
    /// token with its expiry.
    #[instrument(skip(self, token_hash))]
    pub async fn begin_transfer(
        &self,
        handle_id: Uuid,
        token_hash: &str,
        expires_at: chrono::DateTime<chrono::Utc>,
        expected_version: i64,
    ) -> Result<Handle, ApiError> {
        sqlx::query_as::<_, Handle>(
            r#"
            UPDATE handles
            SET status = 'transferring', transfer_token_hash = $1, transfer_expires_at = $2,
                version = version + 1, updated_at = now()
            WHERE handle_id = $3 AND version = $4 AND status = 'active'
            RETURNING handle_id, handle, handle_lower, owner_identity_id, status,
                      reservation_class, is_protected, original_owner_id,
                      transfer_token_hash, transfer_expires_at, version,
                      created_at, updated_at
            "#,
        )
        .bind(token_hash)
        .bind(expires_at)
        .bind(handle_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to begin handle transfer");
            ApiError::InternalError {
                message: "failed to begin transfer".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "handle was modified concurrently, or is not active".to_string(),
        })
    }

    /// Commits a confirmed transfer: new owner takes over, status returns
    /// to `active`, transfer fields clear.
    #[instrument(skip(self))]
    pub async fn commit_transfer(
        &self,
        handle_id: Uuid,
        new_owner_id: Uuid,
        expected_version: i64,
    ) -> Result<Handle, ApiError> {
        sqlx::query_as::<_, Handle>(
            r#"
            UPDATE handles
            SET owner_identity_id = $1, status = 'active', transfer_token_hash = NULL,
                transfer_expires_at = NULL, version = version + 1, updated_at = now()
            WHERE handle_id = $2 AND version = $3 AND status = 'transferring'
            RETURNING handle_id, handle, handle_lower, owner_identity_id, status,
                      reservation_class, is_protected, original_owner_id,
                      transfer_token_hash, transfer_expires_at, version,
                      created_at, updated_at
            "#,
        )
        .bind(new_owner_id)
        .bind(handle_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to commit handle transfer");
            ApiError::InternalError {
                message: "failed to commit transfer".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::TransferConflict)
    }

    /// Reverts an expired transfer back to `active` under the original
    /// owner (spec.md §4.4: "expired tokens auto-revert").
    #[instrument(skip(self))]
    pub async fn revert_expired_transfer(&self, handle_id: Uuid, expected_version: i64) -> Result<Handle, ApiError> {
        sqlx::query_as::<_, Handle>(
            r#"
            UPDATE handles
            SET status = 'active', transfer_token_hash = NULL, transfer_expires_at = NULL,
                version = version + 1, updated_at = now()
            WHERE handle_id = $1 AND version = $2 AND status = 'transferring' AND transfer_expires_at < now()
            RETURNING handle_id, handle, handle_lower, owner_identity_id, status,
                      reservation_class, is_protected, original_owner_id,
                      transfer_token_hash, transfer_expires_at, version,
                      created_at, updated_at
            "#,
        )
        .bind(handle_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to revert expired transfer");
            ApiError::InternalError {
                message: "failed to revert expired transfer".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::TransferConflict)
    }

    #[instrument(skip(self))]
    pub async fn insert_transfer_record(&self, transfer: &HandleTransfer) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO handle_transfers
                (transfer_id, handle_id, from_identity_id, to_identity_id, token_hash, expires_at, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(transfer.transfer_id)
        .bind(transfer.handle_id)
        .bind(transfer.from_identity_id)
        .bind(transfer.to_identity_id)
        .bind(&transfer.token_hash)
        .bind(transfer.expires_at)
        .bind(transfer.confirmed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert transfer record");
            ApiError::InternalError {
                message: "failed to insert transfer record".to_string(),
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_transfer_by_handle(&self, handle_id: Uuid) -> Result<Option<HandleTransfer>, ApiError> {
        sqlx::query_as::<_, HandleTransfer>(
            r#"
            SELECT transfer_id, handle_id, from_identity_id, to_identity_id, token_hash,
                   expires_at, confirmed_at, created_at
            FROM handle_transfers
            WHERE handle_id = $1 AND confirmed_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(handle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up transfer");
            ApiError::InternalError {
                message: "failed to look up transfer".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_transfer_confirmed(&self, transfer_id: Uuid) -> Result<(), ApiError> {
        sqlx::query("UPDATE handle_transfers SET confirmed_at = now() WHERE transfer_id = $1")
            .bind(transfer_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to mark transfer confirmed");
                ApiError::InternalError {
                    message: "failed to mark transfer confirmed".to_string(),
                }
            })?;

        Ok(())
    }

    /// Convenience wrapper over [`HandleRepository::insert_active`] for
    /// callers that aren't composing a larger transaction.
    pub async fn insert_active_standalone(&self, new_handle: &NewHandle) -> Result<Handle, ApiError> {
        self.insert_active(&self.pool, new_handle).await
    }

    /// Exact-availability check: `true` if any active row exists for this
    /// folded handle (spec.md §4.4 step 2 checks both identities and
    /// handles — identities reference `handle_id`, so an active handle row
    /// is the single source of truth).
    #[instrument(skip(self))]
    pub async fn is_taken(&self, handle_lower: &str) -> Result<bool, ApiError> {
        Ok(self.find_active_by_lower(handle_lower).await?.is_some())
    }
}
