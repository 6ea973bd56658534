//! End-to-end tests for the ledgerd binary

mod common;

use anyhow::Result;
use common::*;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_config(root: &Path) -> Result<std::path::PathBuf> {
    let config = config_in(root, false);
    let path = root.join("ledger.toml");
    std::fs::write(&path, config.to_toml()?)?;
    Ok(path)
}

fn ledgerd(config: &Path, args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_ledgerd"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .env_remove("RENDER")
        .env_remove("RENDER_SERVICE_NAME")
        .env_remove("RENDER_EXTERNAL_HOSTNAME")
        .env_remove("RENDER_SERVICE_ID")
        .env_remove("RENDER_INSTANCE_ID")
        .env_remove("LEDGER_VOLATILE_HOST")
        .env_remove("HOSTNAME")
        .output()?)
}

#[test]
fn test_config_prints_effective_settings() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = write_config(temp_dir.path())?;

    let output = ledgerd(&config, &["config"])?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[backup]"));
    assert!(stdout.contains("count_threshold = 10"));
    assert!(stdout.contains("[retention]"));
    assert!(stdout.contains("loaded from"));
    Ok(())
}

#[test]
fn test_backup_list_restore_cycle() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();
    let config = write_config(root)?;
    let db = seeded_database(&root.join("finance.db"), 4)?;

    let output = ledgerd(&config, &["backup", "--manual"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = ledgerd(&config, &["list"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("finance_backup_"));
    assert!(stdout.contains("manual"));

    let name = std::fs::read_dir(root.join("backups"))?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .find(|n| n.ends_with(".db"))
        .ok_or_else(|| anyhow::anyhow!("snapshot file missing"))?;

    insert_rows(&db, 4, 3)?;
    assert_eq!(db.ledger_count()?, 7);

    let output = ledgerd(&config, &["restore", &name, "-y"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(db.ledger_count()?, 4);
    Ok(())
}

#[test]
fn test_fingerprint_is_stable_hex() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = write_config(temp_dir.path())?;
    seeded_database(&temp_dir.path().join("finance.db"), 2)?;

    let first = ledgerd(&config, &["fingerprint"])?;
    let second = ledgerd(&config, &["fingerprint"])?;
    assert!(first.status.success());

    let hex = String::from_utf8_lossy(&first.stdout).trim().to_string();
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(first.stdout, second.stdout);
    Ok(())
}

#[test]
fn test_unknown_snapshot_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = write_config(temp_dir.path())?;
    seeded_database(&temp_dir.path().join("finance.db"), 1)?;

    let output = ledgerd(&config, &["delete", "finance_backup_19990101_000000", "-y"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
    Ok(())
}

#[test]
fn test_status_reports_database_and_snapshots() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = write_config(temp_dir.path())?;
    seeded_database(&temp_dir.path().join("finance.db"), 4)?;

    let output = ledgerd(&config, &["backup", "--manual"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = ledgerd(&config, &["status"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Sync Status"));
    assert!(stdout.contains("durable"));
    assert!(stdout.contains("Ledger:    4 rows"));
    assert!(stdout.contains("Count:     1"));

    let fingerprint = ledgerd(&config, &["fingerprint"])?;
    let hex = String::from_utf8_lossy(&fingerprint.stdout).trim().to_string();
    assert!(stdout.contains(&hex[..16]));
    Ok(())
}
