//! # Sync Job Domain
//!
//! Entities, append-only events, and value objects for the cross-platform
//! sync engine (spec.md §4.8).

mod entities;
mod events;
mod value_objects;

pub use entities::{
    ConflictResolution, JobStatus, NewSyncJob, SyncJob, SyncPriority, TargetOutcome,
};
pub use events::SyncJobEvent;
pub use value_objects::{backoff_with_jitter, next_retry_at, payload_checksum};
