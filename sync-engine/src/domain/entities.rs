//! # Sync Job Domain Entities
//!
//! Maps to the `sync_jobs` table (spec.md §3, §4.8). `SyncJob` is the
//! aggregate root of the cross-platform sync engine's outbox/worker queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Job lifecycle status (spec.md §4.8's state machine:
/// `pending → ready → leased → processing → {completed, failed, retrying}`;
/// `retrying → ready`; any → `cancelled`).
///
/// This crate resolves dependency-eligibility synchronously at enqueue
/// time rather than leaving jobs parked in `Pending`: a job with no unmet
/// `depends_on` (after the implicit per-entity FIFO edge is added, spec.md
/// §4.8's design note) is inserted directly as `Ready`; one with unmet
/// dependencies starts `WaitingDeps` and a promotion sweep moves it to
/// `Ready` once they all reach a terminal state. `Pending` is kept in the
/// enum for fidelity to spec.md's literal status list but this
/// implementation never leaves a row there. The worker leases from
/// `{Ready, Retrying}` — `Retrying → Ready` is likewise folded into the
/// lease query's `scheduled_at ≤ now()` check rather than a separate row
/// flip (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sync_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Ready,
    WaitingDeps,
    Leased,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    /// Terminal statuses satisfy a `depends_on` edge for every downstream
    /// job, per spec.md §4.8 step 1 ("all dependencies in a terminal
    /// state").
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed)
    }
}

/// `critical(1), high(2), normal(3), low(4)` (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sync_job_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncPriority {
    Critical = 1,
    High = 2,
    Normal = 3,
    Low = 4,
}

/// Strategy applied when a target platform reports a version conflict
/// (spec.md §4.8 "Conflict resolution").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "conflict_resolution", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    LatestWins,
    SourceWins,
    Manual,
}

/// A sync job — one outbox row propagating a replicated-field mutation to
/// one or more downstream platforms (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncJob {
    pub job_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub source_platform: String,
    pub target_platforms: Vec<String>,
    pub payload: Value,
    pub delta: Option<Value>,
    pub status: JobStatus,
    pub priority: SyncPriority,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_at: DateTime<Utc>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub depends_on: Vec<Uuid>,
    pub blocks: Vec<Uuid>,
    pub parent_job_id: Option<Uuid>,
    pub conflict_resolution: ConflictResolution,
    pub has_conflicts: bool,
    pub rollback_data: Option<Value>,
    pub rollback_job_id: Option<Uuid>,
    pub payload_checksum: String,
    pub is_batch_job: bool,
    pub batch_id: Option<Uuid>,
    pub batch_index: Option<i32>,
    pub total_batches: Option<i32>,
    pub parallel_processing: bool,
    pub max_parallel_jobs: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to enqueue a new job. `max_attempts` defaults to `5`
/// (spec.md §4.8) if not overridden.
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub source_platform: String,
    pub target_platforms: Vec<String>,
    pub payload: Value,
    pub delta: Option<Value>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub depends_on: Vec<Uuid>,
    pub priority: SyncPriority,
    pub conflict_resolution: ConflictResolution,
    pub rollback_data: Option<Value>,
    pub max_attempts: Option<i32>,
    pub parent_job_id: Option<Uuid>,
}

impl NewSyncJob {
    pub fn max_attempts_or_default(&self) -> i32 {
        self.max_attempts.unwrap_or(5)
    }
}

/// The outcome the engine must decide between for one target platform when
/// applying a job's payload (spec.md §4.8 step 2/3).
#[derive(Debug, Clone)]
pub enum TargetOutcome {
    Success,
    /// The target reported `409_conflict`, carrying its own version of the
    /// record so `conflict_resolution` can be applied.
    Conflict { remote_payload: Value },
    RetryableFailure { reason: String },
    PermanentFailure { reason: String },
}
