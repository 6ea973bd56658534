//! Directory backend: folders are subdirectories of a root path
//!
//! Useful for a mounted persistent volume, and as the archive in tests.
//! Remote identifiers are `<folder>/<file name>` relative to the root.

use crate::archive::{sort_newest_first, RemoteArchive, RemoteEntry};
use chrono::{DateTime, Utc};
use ledger_core::error::IoResultExt;
use ledger_core::{Result, SyncError};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identifier under the root, rejecting anything that escapes it
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let escapes = path.components().any(|c| !matches!(c, Component::Normal(_)));
        if relative.is_empty() || escapes {
            return Err(SyncError::transport(
                "resolve",
                format!("invalid remote identifier {:?}", relative),
            ));
        }
        Ok(self.root.join(path))
    }
}

impl RemoteArchive for DirArchive {
    fn find_folder(&self, name: &str) -> Result<Option<String>> {
        let path = self.resolve(name)?;
        Ok(path.is_dir().then(|| name.to_string()))
    }

    fn create_folder(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        fs::create_dir_all(&path).at_path(&path)?;
        tracing::info!("Created archive folder {}", path.display());
        Ok(name.to_string())
    }

    fn upload(&self, local: &Path, folder_id: &str) -> Result<String> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| SyncError::transport("upload", format!("{} has no file name", local.display())))?;
        let folder = self.resolve(folder_id)?;
        if !folder.is_dir() {
            return Err(SyncError::transport(
                "upload",
                format!("folder {} does not exist", folder_id),
            ));
        }

        let dest = folder.join(&file_name);
        fs::copy(local, &dest).map_err(|e| SyncError::transport("upload", e))?;
        Ok(format!("{}/{}", folder_id, file_name))
    }

    fn list(&self, folder_id: &str) -> Result<Vec<RemoteEntry>> {
        let folder = self.resolve(folder_id)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&folder).map_err(|e| SyncError::transport("list", e))? {
            let entry = entry.at_path(&folder)?;
            let metadata = entry.metadata().at_path(&entry.path())?;
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            entries.push(RemoteEntry {
                id: format!("{}/{}", folder_id, name),
                name,
                created_at,
                size_bytes: Some(metadata.len()),
            });
        }

        sort_newest_first(&mut entries);
        Ok(entries)
    }

    fn download(&self, remote_id: &str, dest: &Path) -> Result<()> {
        let source = self.resolve(remote_id)?;
        fs::copy(&source, dest).map_err(|e| SyncError::transport("download", e))?;
        Ok(())
    }

    fn delete(&self, remote_id: &str) -> Result<()> {
        let path = self.resolve(remote_id)?;
        fs::remove_file(&path).map_err(|e| SyncError::transport("delete", e))
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
