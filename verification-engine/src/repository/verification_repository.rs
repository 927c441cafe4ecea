//! # Verification Repository
//!
//! PostgreSQL-based repository for the request queue, its documents, and
//! the badge write-through to `identities` (spec.md §3, §4.7).
//!
//! `approve` crosses the `verification_requests` and `identities` tables in
//! one transaction, following the same pattern `handle-engine`'s
//! `commit_claim` uses for `handles`/`protected_entries`.

use sqlx::PgPool;
use tracing::{error, instrument};
use uuid::Uuid;

use shared::errors::ApiError;

use crate::domain::{
    Document, NewDocument, NewVerificationRequest, RequestStatus, VerificationBadge,
    VerificationRequest,
};

#[derive(Clone)]
pub struct VerificationRepository {
    pool: PgPool,
}

impl VerificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn insert_request(&self, new: &NewVerificationRequest) -> Result<VerificationRequest, ApiError> {
        sqlx::query_as::<_, VerificationRequest>(
            r#"
            INSERT INTO verification_requests
                (request_id, identity_id, request_type, priority, status, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'submitted', 1, now(), now())
            RETURNING request_id, identity_id, request_type, priority, status, assigned_reviewer,
                      rejection_reason, decision_signature, decision_signing_key_id, version,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.identity_id)
        .bind(new.request_type)
        .bind(new.priority)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to insert verification request");
            ApiError::InternalError {
                message: "failed to insert verification request".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn find_request(&self, request_id: Uuid) -> Result<Option<VerificationRequest>, ApiError> {
        sqlx::query_as::<_, VerificationRequest>(
            r#"
            SELECT request_id, identity_id, request_type, priority, status, assigned_reviewer,
                   rejection_reason, decision_signature, decision_signing_key_id, version,
                   created_at, updated_at
            FROM verification_requests
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to find verification request");
            ApiError::InternalError {
                message: "failed to find verification request".to_string(),
            }
        })
    }

    /// Reviewer queue ordering per spec.md §4.7: `(priority ASC, created_at ASC)`.
    #[instrument(skip(self))]
    pub async fn list_queue(&self, limit: i64) -> Result<Vec<VerificationRequest>, ApiError> {
        sqlx::query_as::<_, VerificationRequest>(
            r#"
            SELECT request_id, identity_id, request_type, priority, status, assigned_reviewer,
                   rejection_reason, decision_signature, decision_signing_key_id, version,
                   created_at, updated_at
            FROM verification_requests
            WHERE status = 'submitted'
            ORDER BY priority ASC, created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list verification queue");
            ApiError::InternalError {
                message: "failed to list verification queue".to_string(),
            }
        })
    }

    /// `submitted → under_review`, guarded so only one reviewer wins a race
    /// to claim the same request.
    #[instrument(skip(self))]
    pub async fn assign_reviewer(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
    ) -> Result<VerificationRequest, ApiError> {
        sqlx::query_as::<_, VerificationRequest>(
            r#"
            UPDATE verification_requests
            SET status = 'under_review', assigned_reviewer = $1, version = version + 1, updated_at = now()
            WHERE request_id = $2 AND version = $3 AND status = 'submitted'
            RETURNING request_id, identity_id, request_type, priority, status, assigned_reviewer,
                      rejection_reason, decision_signature, decision_signing_key_id, version,
                      created_at, updated_at
            "#,
        )
        .bind(reviewer_id)
        .bind(request_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to assign reviewer");
            ApiError::InternalError {
                message: "failed to assign reviewer".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "verification request already claimed or modified".to_string(),
        })
    }

    /// Approves a request and, in the same transaction, writes the granted
    /// badge through to the identity row (spec.md §4.7).
    #[instrument(skip(self, decision_signature))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
        identity_id: Uuid,
        badge: VerificationBadge,
        decision_signature: &str,
        decision_signing_key_id: &str,
    ) -> Result<VerificationRequest, ApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(error = %e, "failed to begin approval transaction");
            ApiError::InternalError {
                message: "failed to begin transaction".to_string(),
            }
        })?;

        let request = sqlx::query_as::<_, VerificationRequest>(
            r#"
            UPDATE verification_requests
            SET status = 'approved', decision_signature = $1, decision_signing_key_id = $2,
                version = version + 1, updated_at = now()
            WHERE request_id = $3 AND assigned_reviewer = $4 AND version = $5 AND status = 'under_review'
            RETURNING request_id, identity_id, request_type, priority, status, assigned_reviewer,
                      rejection_reason, decision_signature, decision_signing_key_id, version,
                      created_at, updated_at
            "#,
        )
        .bind(decision_signature)
        .bind(decision_signing_key_id)
        .bind(request_id)
        .bind(reviewer_id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to approve verification request");
            ApiError::InternalError {
                message: "failed to approve verification request".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "verification request was modified concurrently".to_string(),
        })?;

        sqlx::query(
            r#"
            UPDATE identities
            SET verification_status = 'verified', verification_badge = $1, version = version + 1, updated_at = now()
            WHERE identity_id = $2
            "#,
        )
        .bind(badge.to_string())
        .bind(identity_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to write verification badge to identity");
            ApiError::InternalError {
                message: "failed to write verification badge to identity".to_string(),
            }
        })?;

        tx.commit().await.map_err(|e| {
            error!(error = %e, "failed to commit approval transaction");
            ApiError::InternalError {
                message: "failed to commit transaction".to_string(),
            }
        })?;

        Ok(request)
    }

    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
        reason: &str,
        decision_signature: &str,
        decision_signing_key_id: &str,
    ) -> Result<VerificationRequest, ApiError> {
        sqlx::query_as::<_, VerificationRequest>(
            r#"
            UPDATE verification_requests
            SET status = 'rejected', rejection_reason = $1, decision_signature = $2,
                decision_signing_key_id = $3, version = version + 1, updated_at = now()
            WHERE request_id = $4 AND assigned_reviewer = $5 AND version = $6 AND status = 'under_review'
            RETURNING request_id, identity_id, request_type, priority, status, assigned_reviewer,
                      rejection_reason, decision_signature, decision_signing_key_id, version,
                      created_at, updated_at
            "#,
        )
        .bind(reason)
        .bind(decision_signature)
        .bind(decision_signing_key_id)
        .bind(request_id)
        .bind(reviewer_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to reject verification request");
            ApiError::InternalError {
                message: "failed to reject verification request".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "verification request was modified concurrently".to_string(),
        })
    }

    /// `under_review → needs_info`; the reviewer's note is carried in
    /// `rejection_reason` (repurposed as a general "reviewer note" column).
    #[instrument(skip(self))]
    pub async fn request_more_info(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
        note: &str,
    ) -> Result<VerificationRequest, ApiError> {
        sqlx::query_as::<_, VerificationRequest>(
            r#"
            UPDATE verification_requests
            SET status = 'needs_info', rejection_reason = $1, version = version + 1, updated_at = now()
            WHERE request_id = $2 AND assigned_reviewer = $3 AND version = $4 AND status = 'under_review'
            RETURNING request_id, identity_id, request_type, priority, status, assigned_reviewer,
                      rejection_reason, decision_signature, decision_signing_key_id, version,
                      created_at, updated_at
            "#,
        )
        .bind(note)
        .bind(request_id)
        .bind(reviewer_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to request more info");
            ApiError::InternalError {
                message: "failed to request more info".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "verification request was modified concurrently".to_string(),
        })
    }

    /// `needs_info → submitted`, preserving `request_id`, re-entering the
    /// queue unassigned (spec.md §4.7).
    #[instrument(skip(self))]
    pub async fn resubmit(&self, request_id: Uuid, expected_version: i64) -> Result<VerificationRequest, ApiError> {
        sqlx::query_as::<_, VerificationRequest>(
            r#"
            UPDATE verification_requests
            SET status = 'submitted', assigned_reviewer = NULL, version = version + 1, updated_at = now()
            WHERE request_id = $1 AND version = $2 AND status = 'needs_info'
            RETURNING request_id, identity_id, request_type, priority, status, assigned_reviewer,
                      rejection_reason, decision_signature, decision_signing_key_id, version,
                      created_at, updated_at
            "#,
        )
        .bind(request_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to resubmit verification request");
            ApiError::InternalError {
                message: "failed to resubmit verification request".to_string(),
            }
        })?
        .ok_or_else(|| ApiError::Conflict {
            resource: "verification request was modified concurrently".to_string(),
        })
    }

    /// Finds the document with this content address, if any already exists.
    #[instrument(skip(self))]
    pub async fn find_document_by_hash(&self, sha256_hash: &str) -> Result<Option<Document>, ApiError> {
        sqlx::query_as::<_, Document>(
            r#"
            SELECT document_id, sha256_hash, document_type, blob_url, size_bytes, mime_type, verified, created_at
            FROM verification_documents
            WHERE sha256_hash = $1
            "#,
        )
        .bind(sha256_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to look up document by hash");
            ApiError::InternalError {
                message: "failed to look up document by hash".to_string(),
            }
        })
    }

    /// Inserts a new document row, or returns the existing one if this
    /// content address was already uploaded (spec.md §4.7: "the same
    /// document may back multiple requests").
    #[instrument(skip(self))]
    pub async fn find_or_create_document(&self, new: &NewDocument) -> Result<Document, ApiError> {
        sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO verification_documents
                (document_id, sha256_hash, document_type, blob_url, size_bytes, mime_type, verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, false, now())
            ON CONFLICT (sha256_hash) DO UPDATE SET sha256_hash = excluded.sha256_hash
            RETURNING document_id, sha256_hash, document_type, blob_url, size_bytes, mime_type, verified, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.sha256_hash)
        .bind(&new.document_type)
        .bind(&new.blob_url)
        .bind(new.size_bytes)
        .bind(&new.mime_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to find or create document");
            ApiError::InternalError {
                message: "failed to find or create document".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn attach_document(&self, request_id: Uuid, document_id: Uuid) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO verification_request_documents (request_id, document_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(request_id)
        .bind(document_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to attach document to request");
            ApiError::InternalError {
                message: "failed to attach document to request".to_string(),
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_documents_for_request(&self, request_id: Uuid) -> Result<Vec<Document>, ApiError> {
        sqlx::query_as::<_, Document>(
            r#"
            SELECT d.document_id, d.sha256_hash, d.document_type, d.blob_url, d.size_bytes,
                   d.mime_type, d.verified, d.created_at
            FROM verification_documents d
            JOIN verification_request_documents rd ON rd.document_id = d.document_id
            WHERE rd.request_id = $1
            ORDER BY d.created_at ASC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list documents for request");
            ApiError::InternalError {
                message: "failed to list documents for request".to_string(),
            }
        })
    }
}
