//! Ledger Core - storage primitives shared by the sync daemon
//!
//! This crate provides the foundational layer every other component builds on:
//! - Host classification (volatile vs durable filesystem)
//! - The shared database accessor and fixed ledger schema
//! - Content fingerprints for change detection
//! - The error taxonomy used across crate boundaries

pub mod db;
pub mod env;
pub mod error;
pub mod fingerprint;

// Re-export main types for convenience
pub use db::{Database, LedgerEntry, RowCounts, LEDGER_TABLE, LOOKUP_TABLE};
pub use env::{is_volatile_host, HostClassifier};
pub use error::{ErrorKind, SyncError};
pub use fingerprint::Fingerprint;

/// Common result type used throughout the ledger crates
pub type Result<T> = std::result::Result<T, SyncError>;
