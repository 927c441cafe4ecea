//! # Sync Job Repository Layer

mod sync_repository;

pub use sync_repository::SyncJobRepository;
