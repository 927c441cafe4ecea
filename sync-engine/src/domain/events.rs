//! # Sync Job Events
//!
//! Append-only log of job transitions, attempts, and per-target outcomes
//! (spec.md §9's "sync queue as state machine" note): kept separate from
//! the compact `sync_jobs` row so the job's current state stays a handful
//! of columns while full history remains queryable. Modeled the same way
//! the teacher's per-service `domain/events.rs` modules tag their
//! lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in a job's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncJobEvent {
    Enqueued {
        job_id: Uuid,
        entity_type: String,
        entity_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    LeaseAcquired {
        job_id: Uuid,
        worker_id: String,
        lease_expires_at: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    LeaseReclaimed {
        job_id: Uuid,
        previous_owner: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    TargetResult {
        job_id: Uuid,
        target_platform: String,
        success: bool,
        detail: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    ConflictDetected {
        job_id: Uuid,
        target_platform: String,
        strategy: String,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        job_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    Retrying {
        job_id: Uuid,
        attempt: i32,
        next_retry_at: DateTime<Utc>,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        job_id: Uuid,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        job_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    RollbackEnqueued {
        job_id: Uuid,
        rollback_job_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
}

impl SyncJobEvent {
    /// Returns the event type as a string, stored alongside the full
    /// payload so the event table can be filtered without a JSON query.
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncJobEvent::Enqueued { .. } => "sync_job.enqueued",
            SyncJobEvent::LeaseAcquired { .. } => "sync_job.lease_acquired",
            SyncJobEvent::LeaseReclaimed { .. } => "sync_job.lease_reclaimed",
            SyncJobEvent::TargetResult { .. } => "sync_job.target_result",
            SyncJobEvent::ConflictDetected { .. } => "sync_job.conflict_detected",
            SyncJobEvent::Completed { .. } => "sync_job.completed",
            SyncJobEvent::Retrying { .. } => "sync_job.retrying",
            SyncJobEvent::Failed { .. } => "sync_job.failed",
            SyncJobEvent::Cancelled { .. } => "sync_job.cancelled",
            SyncJobEvent::RollbackEnqueued { .. } => "sync_job.rollback_enqueued",
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            SyncJobEvent::Enqueued { job_id, .. }
            | SyncJobEvent::LeaseAcquired { job_id, .. }
            | SyncJobEvent::LeaseReclaimed { job_id, .. }
            | SyncJobEvent::TargetResult { job_id, .. }
            | SyncJobEvent::ConflictDetected { job_id, .. }
            | SyncJobEvent::Completed { job_id, .. }
            | SyncJobEvent::Retrying { job_id, .. }
            | SyncJobEvent::Failed { job_id, .. }
            | SyncJobEvent::Cancelled { job_id, .. }
            | SyncJobEvent::RollbackEnqueued { job_id, .. } => *job_id,
        }
    }
}
