//! Local snapshot manager
//!
//! Snapshots live in one directory as `<stem>.db` + `<stem>.json` pairs. A pair
//! with either half missing is never reported; it may belong to a snapshot that
//! is still being written, so listing leaves it on disk.

use crate::retention::{PruneSummary, RetentionPolicy};
use crate::snapshot::{
    sort_newest_first, SnapshotMeta, SnapshotName, SnapshotOrigin, SnapshotRef, DATA_EXT,
    META_EXT,
};
use chrono::Utc;
use ledger_core::db::count_rows_at;
use ledger_core::error::IoResultExt;
use ledger_core::{Database, Result, RowCounts, SyncError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Default stem prefix for snapshot files
pub const DEFAULT_PREFIX: &str = "finance_backup";

/// Sidecar files SQLite may leave next to a database
const SQLITE_SIDECARS: &[&str] = &["-journal", "-wal", "-shm"];

/// Result of a restore or import onto the active database
#[derive(Debug, Clone)]
pub struct RestoreReceipt {
    /// Snapshot or file that was installed
    pub source: String,
    /// Snapshot taken of the previous active file, if one existed
    pub safety_snapshot: Option<SnapshotRef>,
    pub row_counts: RowCounts,
}

/// Creates, lists, prunes and restores local snapshots of the database file
pub struct SnapshotManager {
    dir: PathBuf,
    db: Database,
    prefix: String,
    policy: RetentionPolicy,
    /// Serializes name allocation and pruning within this process
    lock: Mutex<()>,
}

impl SnapshotManager {
    pub fn new(dir: impl Into<PathBuf>, db: Database) -> Self {
        Self {
            dir: dir.into(),
            db,
            prefix: DEFAULT_PREFIX.to_string(),
            policy: RetentionPolicy::default(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Copy the active database byte-for-byte and record its metadata.
    ///
    /// Row counts are read from the copy, not the live file.
    pub fn create_snapshot(&self, origin: SnapshotOrigin) -> Result<SnapshotRef> {
        let source = self.db.path();
        if !source.is_file() {
            return Err(SyncError::io(
                source,
                io::Error::new(io::ErrorKind::NotFound, "active database file is missing"),
            ));
        }

        fs::create_dir_all(&self.dir).at_path(&self.dir)?;

        let _guard = self.lock.lock();
        let name = self.allocate_name();
        let data_path = self.dir.join(name.data_file());
        let meta_path = self.dir.join(name.meta_file());

        if let Err(e) = fs::copy(source, &data_path) {
            remove_if_present(&data_path);
            return Err(SyncError::io(&data_path, e));
        }

        let size_bytes = fs::metadata(&data_path).at_path(&data_path)?.len();
        let row_counts = match count_rows_at(&data_path) {
            Ok(counts) => counts,
            Err(e) => {
                remove_if_present(&data_path);
                return Err(e);
            }
        };

        let created_at = Utc::now();
        let meta = SnapshotMeta::new(name.data_file(), created_at, size_bytes, row_counts, origin);
        if let Err(e) = write_meta(&meta_path, &meta) {
            remove_if_present(&data_path);
            return Err(e);
        }

        tracing::info!(
            "Created {} snapshot {} ({} bytes, {})",
            origin,
            name.stem,
            size_bytes,
            row_counts
        );

        Ok(SnapshotRef {
            stem: name.stem,
            data_path,
            meta_path,
            created_at,
            sequence: name.sequence,
            origin,
            size_bytes,
            row_counts,
            remote_id: None,
        })
    }

    /// First free name for the current second
    fn allocate_name(&self) -> SnapshotName {
        let now = Utc::now();
        let mut sequence = 0;
        loop {
            let name = SnapshotName::new(&self.prefix, now, sequence);
            if !self.dir.join(name.data_file()).exists() && !self.dir.join(name.meta_file()).exists()
            {
                return name;
            }
            sequence += 1;
        }
    }

    /// List valid snapshots, newest first, applying the retention policy.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotRef>> {
        let _guard = self.lock.lock();
        let snapshots = self.scan()?;
        let (kept, summary) = self.apply_retention(snapshots);
        if summary.removed > 0 || summary.failed > 0 {
            tracing::info!(
                "Retention pruned {} snapshot(s), kept {}, {} failed",
                summary.removed,
                summary.kept,
                summary.failed
            );
        }
        Ok(kept)
    }

    /// Run a pruning pass and report what it did
    pub fn prune(&self) -> Result<PruneSummary> {
        let _guard = self.lock.lock();
        let snapshots = self.scan()?;
        Ok(self.apply_retention(snapshots).1)
    }

    /// Newest valid snapshot
    pub fn latest(&self) -> Result<Option<SnapshotRef>> {
        Ok(self.list_snapshots()?.into_iter().next())
    }

    /// Look up a snapshot by stem or file name
    pub fn find(&self, name: &str) -> Result<Option<SnapshotRef>> {
        let stem = name
            .strip_suffix(&format!(".{}", DATA_EXT))
            .or_else(|| name.strip_suffix(&format!(".{}", META_EXT)))
            .unwrap_or(name);
        Ok(self
            .list_snapshots()?
            .into_iter()
            .find(|snapshot| snapshot.stem == stem))
    }

    /// Snapshots with no remote replica yet
    pub fn unreplicated(&self) -> Result<Vec<SnapshotRef>> {
        Ok(self
            .list_snapshots()?
            .into_iter()
            .filter(|snapshot| !snapshot.is_replicated())
            .collect())
    }

    /// Remove a snapshot's data file, then its metadata. Idempotent.
    pub fn delete_snapshot(&self, snapshot: &SnapshotRef) -> Result<()> {
        delete_pair(&snapshot.data_path, &snapshot.meta_path)?;
        tracing::info!("Deleted snapshot {}", snapshot.stem);
        Ok(())
    }

    /// Record the remote identifier of a replicated snapshot
    pub fn mark_replicated(&self, snapshot: &SnapshotRef, remote_id: &str) -> Result<SnapshotRef> {
        let mut meta = read_meta(&snapshot.meta_path, &snapshot.stem)?;
        meta.set_remote_id(remote_id);
        write_meta(&snapshot.meta_path, &meta)?;

        let mut updated = snapshot.clone();
        updated.remote_id = Some(remote_id.to_string());
        Ok(updated)
    }

    /// Replace the active database with a snapshot.
    ///
    /// A safety snapshot of the current file is taken first when it holds
    /// ledger records. If the snapshot is unreadable the active file is left
    /// untouched.
    pub fn restore_snapshot(&self, snapshot: &SnapshotRef) -> Result<RestoreReceipt> {
        self.install_from(&snapshot.data_path, &snapshot.filename())
    }

    /// Replace the active database with an arbitrary database file
    pub fn import_database(&self, path: &Path) -> Result<RestoreReceipt> {
        let label = path.display().to_string();
        self.install_from(path, &label)
    }

    fn install_from(&self, source: &Path, label: &str) -> Result<RestoreReceipt> {
        let expected = count_rows_at(source).map_err(|e| {
            SyncError::Restore(format!("{} is not a readable database: {}", label, e))
        })?;

        // An unreadable file still gets a safety copy attempt
        let safety_snapshot = match self.db.has_ledger_records() {
            Ok(false) => {
                tracing::debug!("No ledger records to protect before restoring {}", label);
                None
            }
            Ok(true) | Err(_) => {
                let safety = self.create_snapshot(SnapshotOrigin::Auto).map_err(|e| {
                    SyncError::Restore(format!(
                        "safety snapshot failed, {} not restored: {}",
                        label, e
                    ))
                })?;
                Some(safety)
            }
        };

        install_database_file(source, self.db.path())
            .map_err(|e| SyncError::Restore(format!("installing {} failed: {}", label, e)))?;

        let row_counts = self.db.row_counts().unwrap_or(expected);
        tracing::info!("Restored {} ({})", label, row_counts);

        Ok(RestoreReceipt {
            source: label.to_string(),
            safety_snapshot,
            row_counts,
        })
    }

    /// Collect valid pairs, newest first
    fn scan(&self) -> Result<Vec<SnapshotRef>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        // stem -> (parsed name, has data, has meta)
        let mut pairs: BTreeMap<String, (SnapshotName, bool, bool)> = BTreeMap::new();
        for entry in fs::read_dir(&self.dir).at_path(&self.dir)? {
            let entry = entry.at_path(&self.dir)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(name) = SnapshotName::parse(&self.prefix, &file_name) else {
                continue;
            };
            let is_data = file_name.ends_with(&format!(".{}", DATA_EXT));
            let is_meta = file_name.ends_with(&format!(".{}", META_EXT));

            let slot = pairs
                .entry(name.stem.clone())
                .or_insert_with(|| (name, false, false));
            slot.1 |= is_data;
            slot.2 |= is_meta;
        }

        let mut snapshots = Vec::new();
        for (stem, (name, has_data, has_meta)) in pairs {
            if !(has_data && has_meta) {
                tracing::debug!(
                    "Skipping orphaned snapshot {} (data: {}, metadata: {})",
                    stem,
                    has_data,
                    has_meta
                );
                continue;
            }

            let data_path = self.dir.join(name.data_file());
            let meta_path = self.dir.join(name.meta_file());
            let meta = match read_meta(&meta_path, &stem) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("Skipping snapshot {}: {}", stem, e);
                    continue;
                }
            };

            snapshots.push(SnapshotRef {
                created_at: meta.created_at().unwrap_or(name.taken_at),
                sequence: name.sequence,
                origin: meta.origin(),
                size_bytes: meta.size_bytes,
                row_counts: meta.row_counts(),
                remote_id: meta.remote_id.clone(),
                stem,
                data_path,
                meta_path,
            });
        }

        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    fn apply_retention(&self, snapshots: Vec<SnapshotRef>) -> (Vec<SnapshotRef>, PruneSummary) {
        let excess: Vec<String> = self
            .policy
            .excess(&snapshots)
            .into_iter()
            .map(|snapshot| snapshot.stem.clone())
            .collect();

        let mut summary = PruneSummary::default();
        let mut kept = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            if !excess.contains(&snapshot.stem) {
                kept.push(snapshot);
                continue;
            }

            match delete_pair(&snapshot.data_path, &snapshot.meta_path) {
                Ok(()) => {
                    tracing::debug!("Pruned {} snapshot {}", snapshot.origin, snapshot.stem);
                    summary.removed += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to prune snapshot {}: {}", snapshot.stem, e);
                    summary.failed += 1;
                }
            }
        }

        summary.kept = kept.len();
        (kept, summary)
    }
}

/// Atomically replace `dest` with a copy of `source`.
///
/// The copy is written to a temporary file beside `dest` and renamed over it,
/// so a failed copy never leaves a partial active file.
pub fn install_database_file(source: &Path, dest: &Path) -> Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).at_path(&parent)?;

    let mut reader = fs::File::open(source).at_path(source)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).at_path(&parent)?;
    io::copy(&mut reader, tmp.as_file_mut()).at_path(tmp.path())?;
    tmp.as_file().sync_all().at_path(tmp.path())?;
    tmp.persist(dest)
        .map_err(|e| SyncError::io(dest, e.error))?;

    // Sidecars belong to the replaced file and would corrupt the new one
    for suffix in SQLITE_SIDECARS {
        let mut sidecar = dest.as_os_str().to_owned();
        sidecar.push(suffix);
        remove_if_present(Path::new(&sidecar));
    }

    Ok(())
}

fn read_meta(path: &Path, stem: &str) -> Result<SnapshotMeta> {
    let contents = fs::read_to_string(path).at_path(path)?;
    SnapshotMeta::from_json(&contents)
        .map_err(|e| SyncError::integrity(stem, format!("unreadable metadata: {}", e)))
}

/// Write metadata via temp file + rename so readers never see a torn record
fn write_meta(path: &Path, meta: &SnapshotMeta) -> Result<()> {
    let json = meta
        .to_json()
        .map_err(|e| SyncError::integrity(&meta.filename, e.to_string()))?;

    let tmp_path = path.with_extension(format!("{}.tmp", META_EXT));
    let mut file = fs::File::create(&tmp_path).at_path(&tmp_path)?;
    file.write_all(json.as_bytes()).at_path(&tmp_path)?;
    file.sync_all().at_path(&tmp_path)?;
    fs::rename(&tmp_path, path).at_path(path)?;
    Ok(())
}

fn delete_pair(data_path: &Path, meta_path: &Path) -> Result<()> {
    for path in [data_path, meta_path] {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Already absent: {}", path.display());
            }
            Err(e) => return Err(SyncError::io(path, e)),
        }
    }
    Ok(())
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::LedgerEntry;
    use tempfile::TempDir;

    fn entry(note: &str) -> LedgerEntry {
        LedgerEntry {
            date: "2025-07-10".into(),
            amount: 10.0,
            note: note.into(),
            operator: "ana".into(),
            kind: "cheltuiala".into(),
            object: "transport".into(),
            person: "necunoscut".into(),
            category: "alte cheltuieli".into(),
        }
    }

    fn setup(rows: usize) -> anyhow::Result<(TempDir, SnapshotManager)> {
        let dir = TempDir::new()?;
        let db = Database::new(dir.path().join("finance.db"));
        db.init_schema()?;
        for i in 0..rows {
            db.insert_entry(&entry(&format!("row {}", i)))?;
        }
        let manager = SnapshotManager::new(dir.path().join("backups"), db);
        Ok((dir, manager))
    }

    #[test]
    fn test_create_records_counts_from_copy() -> anyhow::Result<()> {
        let (_dir, manager) = setup(3)?;
        let snapshot = manager.create_snapshot(SnapshotOrigin::Manual)?;

        assert!(snapshot.data_path.is_file());
        assert!(snapshot.meta_path.is_file());
        assert_eq!(snapshot.row_counts.ledger, 3);
        assert_eq!(snapshot.size_bytes, fs::metadata(&snapshot.data_path)?.len());
        assert_eq!(fs::read(&snapshot.data_path)?, fs::read(manager.database().path())?);
        Ok(())
    }

    #[test]
    fn test_create_fails_without_source() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let manager = SnapshotManager::new(dir.path().join("backups"), Database::new(dir.path().join("none.db")));
        let err = manager.create_snapshot(SnapshotOrigin::Auto).unwrap_err();
        assert_eq!(err.kind(), ledger_core::ErrorKind::Io);
        Ok(())
    }

    #[test]
    fn test_same_second_names_do_not_collide() -> anyhow::Result<()> {
        let (_dir, manager) = setup(1)?;
        let a = manager.create_snapshot(SnapshotOrigin::Manual)?;
        let b = manager.create_snapshot(SnapshotOrigin::Manual)?;
        assert_ne!(a.stem, b.stem);

        let listed = manager.list_snapshots()?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].stem, b.stem);
        Ok(())
    }

    #[test]
    fn test_delete_is_idempotent() -> anyhow::Result<()> {
        let (_dir, manager) = setup(1)?;
        let snapshot = manager.create_snapshot(SnapshotOrigin::Manual)?;
        manager.delete_snapshot(&snapshot)?;
        manager.delete_snapshot(&snapshot)?;
        assert!(manager.list_snapshots()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unreadable_metadata_is_skipped() -> anyhow::Result<()> {
        let (_dir, manager) = setup(1)?;
        let snapshot = manager.create_snapshot(SnapshotOrigin::Manual)?;
        fs::write(&snapshot.meta_path, "{ not json")?;
        assert!(manager.list_snapshots()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_mark_replicated_persists() -> anyhow::Result<()> {
        let (_dir, manager) = setup(1)?;
        let snapshot = manager.create_snapshot(SnapshotOrigin::Auto)?;
        assert_eq!(manager.unreplicated()?.len(), 1);

        let updated = manager.mark_replicated(&snapshot, "remote-1")?;
        assert!(updated.is_replicated());

        let found = manager.find(&snapshot.filename())?.expect("snapshot listed");
        assert_eq!(found.remote_id.as_deref(), Some("remote-1"));
        assert!(manager.unreplicated()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_restore_of_garbage_leaves_active_file() -> anyhow::Result<()> {
        let (dir, manager) = setup(2)?;
        let bogus = dir.path().join("bogus.db");
        fs::write(&bogus, b"this is not sqlite")?;

        let before = fs::read(manager.database().path())?;
        let err = manager.import_database(&bogus).unwrap_err();
        assert_eq!(err.kind(), ledger_core::ErrorKind::Restore);
        assert_eq!(fs::read(manager.database().path())?, before);
        assert!(manager.list_snapshots()?.is_empty(), "no safety snapshot on rejected source");
        Ok(())
    }

    #[test]
    fn test_install_removes_stale_sidecars() -> anyhow::Result<()> {
        let (dir, manager) = setup(1)?;
        let snapshot = manager.create_snapshot(SnapshotOrigin::Manual)?;
        let wal = dir.path().join("finance.db-wal");
        fs::write(&wal, b"stale")?;

        install_database_file(&snapshot.data_path, manager.database().path())?;
        assert!(!wal.exists());
        Ok(())
    }
}
