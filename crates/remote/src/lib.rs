//! Remote archive for ledger snapshots
//!
//! This crate provides:
//! - The [`RemoteArchive`] backend trait
//! - A Google Drive backend with lazily refreshed OAuth credentials
//! - A plain directory backend (mounted volumes, tests)
//! - [`RemoteClient`], which degrades to "unavailable" instead of failing startup
//! - [`ReplicationService`], the optional upload step applied after a local snapshot

pub mod archive;
pub mod client;
pub mod credentials;
pub mod dir;
pub mod drive;
pub mod replicate;

pub use archive::{RemoteArchive, RemoteEntry};
pub use client::RemoteClient;
pub use credentials::{AccessToken, Credentials, TokenCache};
pub use dir::DirArchive;
pub use drive::{DriveArchive, HttpTimeouts};
pub use replicate::{BackupOutcome, ReplicationService, SyncSummary};

/// Folder the original deployment uploads into
pub const DEFAULT_FOLDER_NAME: &str = "AI Finance App Backups";
