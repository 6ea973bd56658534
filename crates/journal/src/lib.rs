//! Snapshot journal for the ledger database
//!
//! This crate provides:
//! - Snapshot naming and metadata records (with legacy field aliases)
//! - The local snapshot manager: create, list, prune, delete, restore
//! - Per-origin retention policies

pub mod manager;
pub mod retention;
pub mod snapshot;

// Re-exports
pub use manager::{install_database_file, RestoreReceipt, SnapshotManager, DEFAULT_PREFIX};
pub use retention::{PruneSummary, RetentionPolicy};
pub use snapshot::{SnapshotMeta, SnapshotName, SnapshotOrigin, SnapshotRef};
