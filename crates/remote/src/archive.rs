//! Backend abstraction for the remote object store

use chrono::{DateTime, Utc};
use ledger_core::Result;
use serde::Serialize;
use std::path::Path;

/// A file stored in the remote folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    /// Backend-assigned identifier
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: Option<u64>,
}

/// A remote object store that holds snapshot copies in named folders.
///
/// Implementations are blocking; async callers run them on a blocking thread.
pub trait RemoteArchive: Send + Sync {
    /// Look up a folder by exact name
    fn find_folder(&self, name: &str) -> Result<Option<String>>;

    /// Create a folder unconditionally
    fn create_folder(&self, name: &str) -> Result<String>;

    /// Upload a local file into a folder, returning its remote identifier
    fn upload(&self, local: &Path, folder_id: &str) -> Result<String>;

    /// Files in a folder, newest first
    fn list(&self, folder_id: &str) -> Result<Vec<RemoteEntry>>;

    /// Write the file's bytes to `dest`
    fn download(&self, remote_id: &str, dest: &Path) -> Result<()>;

    fn delete(&self, remote_id: &str) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Sort entries newest first, breaking ties by name
pub fn sort_newest_first(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.name.cmp(&a.name))
    });
}
