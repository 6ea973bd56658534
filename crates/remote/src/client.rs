//! Remote archive client bound to one well-known folder

use crate::archive::{RemoteArchive, RemoteEntry};
use ledger_core::error::IoResultExt;
use ledger_core::{Result, SyncError};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Client for the snapshot folder of a remote archive.
///
/// Without a usable backend the client is "unavailable": every operation logs
/// a warning and returns [`SyncError::Unavailable`] so callers can treat it as
/// a no-op.
pub struct RemoteClient {
    backend: Option<Arc<dyn RemoteArchive>>,
    folder_name: String,
    /// Why the backend is missing
    unavailable_reason: String,
    /// Resolved folder id; the lock is held across lookup + create
    folder_id: Mutex<Option<String>>,
}

impl RemoteClient {
    pub fn new(backend: Arc<dyn RemoteArchive>, folder_name: impl Into<String>) -> Self {
        Self {
            backend: Some(backend),
            folder_name: folder_name.into(),
            unavailable_reason: String::new(),
            folder_id: Mutex::new(None),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: None,
            folder_name: String::new(),
            unavailable_reason: reason.into(),
            folder_id: Mutex::new(None),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Backend name, or "unavailable"
    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("unavailable", |b| b.name())
    }

    fn backend(&self, operation: &str) -> Result<&dyn RemoteArchive> {
        match &self.backend {
            Some(backend) => Ok(backend.as_ref()),
            None => {
                tracing::warn!(
                    "Skipping remote {}: archive unavailable ({})",
                    operation,
                    self.unavailable_reason
                );
                Err(SyncError::Unavailable(self.unavailable_reason.clone()))
            }
        }
    }

    /// Resolve the snapshot folder, creating it only if a lookup finds nothing
    pub fn ensure_folder(&self) -> Result<String> {
        let backend = self.backend("folder lookup")?;
        let mut cached = self.folder_id.lock();
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match backend.find_folder(&self.folder_name)? {
            Some(id) => {
                tracing::debug!("Found remote folder {} ({})", self.folder_name, id);
                id
            }
            None => backend.create_folder(&self.folder_name)?,
        };
        *cached = Some(id.clone());
        Ok(id)
    }

    /// Upload a local file into the snapshot folder
    pub fn upload(&self, local: &Path) -> Result<String> {
        let backend = self.backend("upload")?;
        let folder = self.ensure_folder()?;
        let id = backend.upload(local, &folder)?;
        tracing::info!(
            "Uploaded {} to {} ({})",
            local.display(),
            backend.name(),
            id
        );
        Ok(id)
    }

    /// Entries in the snapshot folder, newest first
    pub fn list(&self) -> Result<Vec<RemoteEntry>> {
        let backend = self.backend("list")?;
        let folder = self.ensure_folder()?;
        backend.list(&folder)
    }

    /// Download into `dest` via a temporary file in the same directory.
    ///
    /// A failed or partial transfer never touches `dest`.
    pub fn download(&self, remote_id: &str, dest: &Path) -> Result<()> {
        let backend = self.backend("download")?;
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).at_path(&parent)?;

        let tmp = tempfile::NamedTempFile::new_in(&parent).at_path(&parent)?;
        backend.download(remote_id, tmp.path())?;
        tmp.persist(dest).map_err(|e| SyncError::io(dest, e.error))?;
        Ok(())
    }

    /// Best-effort delete of a remote file
    pub fn delete(&self, remote_id: &str) -> Result<()> {
        let backend = self.backend("delete")?;
        backend.delete(remote_id)?;
        tracing::info!("Deleted remote file {}", remote_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::DirArchive;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts folder creations on top of a directory archive
    struct CountingArchive {
        inner: DirArchive,
        creates: AtomicUsize,
        lookups: AtomicUsize,
    }

    impl RemoteArchive for CountingArchive {
        fn find_folder(&self, name: &str) -> Result<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_folder(name)
        }
        fn create_folder(&self, name: &str) -> Result<String> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_folder(name)
        }
        fn upload(&self, local: &Path, folder_id: &str) -> Result<String> {
            self.inner.upload(local, folder_id)
        }
        fn list(&self, folder_id: &str) -> Result<Vec<RemoteEntry>> {
            self.inner.list(folder_id)
        }
        fn download(&self, remote_id: &str, dest: &Path) -> Result<()> {
            std::fs::write(dest, b"partial").at_path(dest)?;
            if remote_id == "broken" {
                return Err(SyncError::transport("download", "connection reset"));
            }
            self.inner.download(remote_id, dest)
        }
        fn delete(&self, remote_id: &str) -> Result<()> {
            self.inner.delete(remote_id)
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn counting(root: &Path) -> Arc<CountingArchive> {
        Arc::new(CountingArchive {
            inner: DirArchive::new(root),
            creates: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_folder_created_once_across_threads() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let archive = counting(dir.path());
        let client = Arc::new(RemoteClient::new(archive.clone(), "Backups"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                std::thread::spawn(move || client.ensure_folder())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap()?, "Backups");
        }

        assert_eq!(archive.creates.load(Ordering::SeqCst), 1);
        assert_eq!(archive.lookups.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_existing_folder_is_reused() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        std::fs::create_dir(dir.path().join("Backups"))?;
        let archive = counting(dir.path());
        let client = RemoteClient::new(archive.clone(), "Backups");

        client.ensure_folder()?;
        assert_eq!(archive.creates.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_failed_download_leaves_destination() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let client = RemoteClient::new(counting(&dir.path().join("remote")), "Backups");
        let dest = dir.path().join("finance.db");
        std::fs::write(&dest, b"active")?;

        assert!(client.download("broken", &dest).is_err());
        assert_eq!(std::fs::read(&dest)?, b"active");
        Ok(())
    }

    #[test]
    fn test_unavailable_client_is_a_noop() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let client = RemoteClient::unavailable("no credentials");
        assert!(!client.is_available());
        assert_eq!(client.backend_name(), "unavailable");

        let err = client.upload(&dir.path().join("x.db")).unwrap_err();
        assert_eq!(err.kind(), ledger_core::ErrorKind::Unavailable);
        assert!(client.list().is_err());
        assert!(client.delete("x").is_err());
        Ok(())
    }
}
