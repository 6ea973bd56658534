//! Error taxonomy for the durability and sync components
//!
//! Every public operation returns [`SyncError`] so callers get a success/failure
//! plus a reason string, never a panic across a component boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`SyncError`], used for logging and status output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Transport,
    Restore,
    Integrity,
    Database,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Io => "io",
            ErrorKind::Transport => "transport",
            ErrorKind::Restore => "restore",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Database => "database",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by snapshot, restore, remote archive and change detection operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Local file read or write failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote authentication or network failure.
    #[error("transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// No valid restore source, or the copy onto the active file failed.
    #[error("restore failed: {0}")]
    Restore(String),

    /// Snapshot data/metadata pair mismatch or unreadable metadata.
    #[error("integrity error for {name}: {details}")]
    Integrity { name: String, details: String },

    /// SQLite rejected a query against the database or a snapshot copy.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The remote archive has no usable credential or is not configured.
    #[error("remote archive unavailable: {0}")]
    Unavailable(String),
}

impl SyncError {
    /// Wrap an I/O error with the path it concerned
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn integrity(name: impl Into<String>, details: impl Into<String>) -> Self {
        SyncError::Integrity {
            name: name.into(),
            details: details.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Io { .. } => ErrorKind::Io,
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::Restore(_) => ErrorKind::Restore,
            SyncError::Integrity { .. } => ErrorKind::Integrity,
            SyncError::Database(_) => ErrorKind::Database,
            SyncError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Human-readable reason suitable for a status message
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Attach a path to `std::io::Result` values
pub trait IoResultExt<T> {
    fn at_path(self, path: &std::path::Path) -> Result<T, SyncError>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: &std::path::Path) -> Result<T, SyncError> {
        self.map_err(|e| SyncError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = SyncError::io("/tmp/x.db", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.reason().contains("/tmp/x.db"));

        let err = SyncError::transport("upload", "connection reset");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.reason(), "transport error during upload: connection reset");

        assert_eq!(SyncError::Restore("nope".into()).kind(), ErrorKind::Restore);
        assert_eq!(SyncError::integrity("a.db", "missing metadata").kind(), ErrorKind::Integrity);
        assert_eq!(SyncError::Unavailable("no token".into()).kind().as_str(), "unavailable");
    }
}
