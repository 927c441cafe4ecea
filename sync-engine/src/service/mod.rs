//! # Sync Engine Service Layer

mod platform_adapter;
mod sync_service;

pub use platform_adapter::PlatformAdapter;
pub use sync_service::SyncService;
