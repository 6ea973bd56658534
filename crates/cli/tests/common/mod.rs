//! Shared fixtures for the daemon integration tests

#![allow(dead_code)]

use anyhow::Result;
use ledger_core::{Database, HostClassifier, LedgerEntry};
use ledger_sync::context::SyncContext;
use ledger_sync::system_config::{LedgerConfig, RemoteBackend};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub const FOLDER: &str = "AI Finance App Backups";

pub fn entry(i: usize) -> LedgerEntry {
    LedgerEntry {
        date: "2025-07-10".to_string(),
        amount: 10.0 + i as f64,
        note: format!("cafea {}", i),
        operator: "ana".to_string(),
        kind: "cheltuiala".to_string(),
        object: "necunoscut".to_string(),
        person: "necunoscut".to_string(),
        category: "alte cheltuieli".to_string(),
    }
}

pub fn insert_rows(db: &Database, from: usize, count: usize) -> Result<()> {
    for i in from..from + count {
        db.insert_entry(&entry(i))?;
    }
    Ok(())
}

/// A database file at `path` holding `rows` ledger records
pub fn seeded_database(path: &Path, rows: usize) -> Result<Database> {
    let db = Database::new(path);
    db.init_schema()?;
    insert_rows(&db, 0, rows)?;
    Ok(db)
}

/// Configuration rooted in a temp dir; `remote` enables the directory backend
pub fn config_in(root: &Path, remote: bool) -> LedgerConfig {
    let mut config = LedgerConfig::default();
    config.paths.database = root.join("finance.db");
    config.paths.snapshot_dir = root.join("backups");
    config.paths.state_dir = root.join(".ledgerd");
    if remote {
        config.remote.backend = RemoteBackend::Directory;
        config.remote.directory = Some(root.join("archive"));
    }
    config
}

pub fn context(root: &Path, classifier: HostClassifier, remote: bool) -> Result<SyncContext> {
    SyncContext::with_classifier(config_in(root, remote), classifier)
}

pub fn remote_folder(root: &Path) -> PathBuf {
    root.join("archive").join(FOLDER)
}

/// Put a database with `rows` records into the remote folder, stamped `age` ago
pub fn upload_remote_snapshot(
    root: &Path,
    name: &str,
    rows: usize,
    age: Duration,
) -> Result<()> {
    let staging = TempDir::new()?;
    let source = staging.path().join(name);
    seeded_database(&source, rows)?;

    let folder = remote_folder(root);
    std::fs::create_dir_all(&folder)?;
    let dest = folder.join(name);
    std::fs::copy(&source, &dest)?;

    let file = std::fs::File::options().write(true).open(&dest)?;
    file.set_modified(SystemTime::now() - age)?;
    Ok(())
}
