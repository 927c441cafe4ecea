//! # Platform Adapter
//!
//! Abstracts the downstream platform a sync job's payload is applied to
//! (spec.md §4.8 step 2: "apply the payload to each target platform").
//! Modeled on the teacher's `StorageBackend` trait
//! (`content-service/src/storage/backend.rs`): one `name()` method for
//! logging plus the operations a worker needs, returning the workspace's
//! shared `ApiError` rather than a bespoke error enum, consistent with how
//! every other engine crate in this workspace reports failures.

use async_trait::async_trait;
use serde_json::Value;

use shared::errors::ApiError;

use crate::domain::TargetOutcome;

/// One downstream platform a sync job can target (e.g. an LMS mirror, a
/// partner directory, a billing system). Registered with the worker by
/// platform name (spec.md §4.8's `target_platforms` list).
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The platform identifier this adapter applies to, matched against a
    /// job's `target_platforms` entries.
    fn name(&self) -> &str;

    /// Applies `payload` (or, when present, just `delta`) for `entity_id`
    /// to this platform. Implementations report a version conflict as
    /// `TargetOutcome::Conflict`, not an `Err`, so the caller can apply
    /// `conflict_resolution` instead of treating it as a transport failure.
    async fn apply(
        &self,
        entity_type: &str,
        entity_id: uuid::Uuid,
        payload: &Value,
        delta: Option<&Value>,
    ) -> Result<TargetOutcome, ApiError>;

    /// Applies a compensating rollback (spec.md §4.8 "Rollback": reverts
    /// the effect of a job whose sibling targets failed permanently).
    async fn rollback(
        &self,
        entity_type: &str,
        entity_id: uuid::Uuid,
        rollback_data: &Value,
    ) -> Result<(), ApiError>;
}
