//! # Cross-Platform Sync Engine (C8)
//!
//! Outbox pattern for propagating identity/handle/profile mutations to
//! downstream platforms (spec.md §4.8). A mutation's transaction writes a
//! `sync_jobs` row in the same commit; a cooperative worker pool leases
//! jobs, dispatches them through per-platform [`service::PlatformAdapter`]
//! implementations, and resolves a terminal status with exponential
//! backoff, conflict resolution, and compensating rollback jobs.
//!
//! Job rows carry only state-machine fields; every transition, lease
//! event, and per-target outcome is appended to a separate
//! `sync_job_events` table (spec.md §9's "sync queue as state machine"
//! design note) so the job row stays small under heavy retry churn.
//! Per-entity ordering (spec.md §5) is modeled as an implicit dependency
//! edge to the most recent non-terminal job for the same entity — no
//! separate code path from explicit `depends_on`.

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{
    backoff_with_jitter, next_retry_at, payload_checksum, ConflictResolution, JobStatus,
    NewSyncJob, SyncJob, SyncJobEvent, SyncPriority, TargetOutcome,
};
pub use repository::SyncJobRepository;
pub use service::{PlatformAdapter, SyncService};
