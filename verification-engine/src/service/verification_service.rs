//! # Verification Service
//!
//! Orchestrates document intake, the request state machine, and the
//! badge-grant transaction (spec.md §4.7).

use tracing::{info, instrument};
use uuid::Uuid;

use eid_crypto::signing::SignatureKeyRing;
use shared::errors::ApiError;

use crate::domain::{
    content_hash, decision_payload, Document, NewDocument, NewVerificationRequest, RequestType,
    VerificationRequest,
};
use crate::repository::VerificationRepository;

/// Priority assigned to a self-filed request that didn't arrive through a
/// handle claim (spec.md §4.4 only defines priority for claim-driven
/// requests; `3` — the queue's midpoint — is this crate's Open Question
/// resolution for the rest, documented in DESIGN.md).
pub const DEFAULT_PRIORITY: i16 = 3;

/// A document the caller has already uploaded to blob storage, ready to be
/// content-addressed and attached to a request.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub document_type: String,
    pub blob_url: String,
    pub content: Vec<u8>,
    pub mime_type: String,
}

fn validate_priority(priority: i16) -> Result<(), ApiError> {
    if !(1..=5).contains(&priority) {
        return Err(ApiError::InvalidArgument {
            message: "priority must be in 1..=5".to_string(),
        });
    }
    Ok(())
}

pub struct VerificationService {
    repository: VerificationRepository,
    signing_keys: SignatureKeyRing,
}

impl VerificationService {
    pub fn new(repository: VerificationRepository, signing_keys: SignatureKeyRing) -> Self {
        Self {
            repository,
            signing_keys,
        }
    }

    /// Submits a request with its supporting documents. `priority` is
    /// normally derived by the caller from a handle-claim tier (spec.md
    /// §4.4) or [`DEFAULT_PRIORITY`] for a self-filed request.
    #[instrument(skip(self, documents))]
    pub async fn submit_request(
        &self,
        identity_id: Uuid,
        request_type: RequestType,
        priority: i16,
        documents: Vec<DocumentUpload>,
    ) -> Result<(VerificationRequest, Vec<Document>), ApiError> {
        validate_priority(priority)?;

        let request = self
            .repository
            .insert_request(&NewVerificationRequest {
                identity_id,
                request_type,
                priority,
            })
            .await?;

        let mut attached = Vec::with_capacity(documents.len());
        for upload in documents {
            let hash = content_hash(&upload.content);
            let document = self
                .repository
                .find_or_create_document(&NewDocument {
                    sha256_hash: hash,
                    document_type: upload.document_type,
                    blob_url: upload.blob_url,
                    size_bytes: upload.content.len() as i64,
                    mime_type: upload.mime_type,
                })
                .await?;
            self.repository.attach_document(request.request_id, document.document_id).await?;
            attached.push(document);
        }

        info!(request_id = %request.request_id, documents = attached.len(), "verification request submitted");
        Ok((request, attached))
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<VerificationRequest, ApiError> {
        self.repository
            .find_request(request_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("verification_request:{request_id}"),
            })
    }

    pub async fn list_documents(&self, request_id: Uuid) -> Result<Vec<Document>, ApiError> {
        self.repository.list_documents_for_request(request_id).await
    }

    /// Reviewer queue, ordered `(priority ASC, created_at ASC)` (spec.md §4.7).
    pub async fn list_queue(&self, limit: i64) -> Result<Vec<VerificationRequest>, ApiError> {
        self.repository.list_queue(limit).await
    }

    /// `submitted → under_review`.
    #[instrument(skip(self))]
    pub async fn claim_for_review(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
    ) -> Result<VerificationRequest, ApiError> {
        self.repository.assign_reviewer(request_id, reviewer_id, expected_version).await
    }

    /// `under_review → approved`, assigning the badge derived from the
    /// request's type and writing it through to the identity in the same
    /// transaction (spec.md §4.7). The decision is signed so it cannot
    /// later be repudiated by the reviewer or forged by a third party.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
    ) -> Result<VerificationRequest, ApiError> {
        let current = self.get_request(request_id).await?;
        let badge = current.request_type.badge();

        let payload = decision_payload(request_id, current.identity_id, "approved", reviewer_id);
        let (signature, key_id) = self.signing_keys.sign(&payload)?;

        let approved = self
            .repository
            .approve(
                request_id,
                reviewer_id,
                expected_version,
                current.identity_id,
                badge,
                &signature,
                &key_id,
            )
            .await?;

        info!(request_id = %request_id, badge = %badge, "verification request approved");
        Ok(approved)
    }

    /// `under_review → rejected`, with a reason. Does not alter any
    /// already-granted badge on the identity — a rejection only speaks to
    /// this request (spec.md §4.7's consistency invariant ties the badge to
    /// *a* request being `approved`, not to this one specifically).
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
        reason: &str,
    ) -> Result<VerificationRequest, ApiError> {
        let current = self.get_request(request_id).await?;
        let payload = decision_payload(request_id, current.identity_id, "rejected", reviewer_id);
        let (signature, key_id) = self.signing_keys.sign(&payload)?;

        let rejected = self
            .repository
            .reject(request_id, reviewer_id, expected_version, reason, &signature, &key_id)
            .await?;

        info!(request_id = %request_id, "verification request rejected");
        Ok(rejected)
    }

    /// `under_review → needs_info`.
    #[instrument(skip(self))]
    pub async fn request_more_info(
        &self,
        request_id: Uuid,
        reviewer_id: Uuid,
        expected_version: i64,
        note: &str,
    ) -> Result<VerificationRequest, ApiError> {
        self.repository.request_more_info(request_id, reviewer_id, expected_version, note).await
    }

    /// `needs_info → submitted`, preserving the request id (spec.md §4.7).
    #[instrument(skip(self))]
    pub async fn resubmit(&self, request_id: Uuid, expected_version: i64) -> Result<VerificationRequest, ApiError> {
        self.repository.resubmit(request_id, expected_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_priority_accepts_range() {
        for p in 1..=5 {
            assert!(validate_priority(p).is_ok());
        }
    }

    #[test]
    fn test_validate_priority_rejects_out_of_range() {
        assert!(validate_priority(0).is_err());
        assert!(validate_priority(6).is_err());
    }

    #[test]
    fn test_badge_mapping() {
        assert_eq!(RequestType::Celebrity.badge().to_string(), "gold");
        assert_eq!(RequestType::Business.badge().to_string(), "business");
        assert_eq!(RequestType::Government.badge().to_string(), "government");
        assert_eq!(RequestType::Standard.badge().to_string(), "blue");
    }
}
