//! Backup loop iterations against a real database

mod common;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use ledger_core::HostClassifier;
use ledger_journal::SnapshotOrigin;
use ledger_sync::context::SyncContext;
use ledger_sync::daemon::{BackupJob, BackupState, BackupTick, BackupTrigger};
use ledger_sync::locks::RestoreLock;
use tempfile::TempDir;

fn job(ctx: &SyncContext) -> BackupJob {
    BackupJob::new(
        ctx.config.backup.to_policy(),
        ctx.classifier.clone(),
        ctx.replication.clone(),
        ctx.state_dir.clone(),
    )
}

#[test]
fn test_tenth_record_triggers_backup() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let ctx = context(temp_dir.path(), HostClassifier::durable(), false)?;
    seeded_database(ctx.db.path(), 0)?;

    let job = job(&ctx);
    let start = Utc::now();
    let mut state = BackupState::starting_at(start, 0);

    insert_rows(&ctx.db, 0, 9)?;
    let tick = job.tick(&mut state, start + ChronoDuration::minutes(5))?;
    assert!(matches!(tick, BackupTick::Idle));
    assert!(ctx.snapshots.list_snapshots()?.is_empty());

    insert_rows(&ctx.db, 9, 1)?;
    let now = start + ChronoDuration::minutes(10);
    match job.tick(&mut state, now)? {
        BackupTick::Completed { trigger, outcome } => {
            assert_eq!(trigger, BackupTrigger::RecordCount);
            assert_eq!(outcome.snapshot.origin, SnapshotOrigin::Auto);
            assert_eq!(outcome.snapshot.row_counts.ledger, 10);
        }
        other => panic!("expected a backup, got {:?}", other),
    }

    // Baselines reset after the backup
    assert_eq!(state.baseline_count, 10);
    assert_eq!(state.last_backup, now);
    assert_eq!(ctx.snapshots.list_snapshots()?.len(), 1);

    let tick = job.tick(&mut state, now + ChronoDuration::minutes(5))?;
    assert!(matches!(tick, BackupTick::Idle));
    Ok(())
}

#[test]
fn test_volatile_host_backs_up_on_short_interval_and_replicates() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let ctx = context(temp_dir.path(), HostClassifier::volatile(), true)?;
    seeded_database(ctx.db.path(), 2)?;

    let job = job(&ctx);
    let start = Utc::now();
    let mut state = BackupState::starting_at(start, 2);

    match job.tick(&mut state, start + ChronoDuration::seconds(61))? {
        BackupTick::Completed { trigger, outcome } => {
            assert_eq!(trigger, BackupTrigger::Elapsed);
            assert!(outcome.is_replicated());
        }
        other => panic!("expected a backup, got {:?}", other),
    }
    assert_eq!(std::fs::read_dir(remote_folder(temp_dir.path()))?.count(), 1);
    Ok(())
}

#[test]
fn test_durable_host_does_not_replicate() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let ctx = context(temp_dir.path(), HostClassifier::durable(), true)?;
    seeded_database(ctx.db.path(), 1)?;

    let job = job(&ctx);
    let start = Utc::now();
    let mut state = BackupState::starting_at(start, 1);

    match job.tick(&mut state, start + ChronoDuration::hours(13))? {
        BackupTick::Completed { trigger, outcome } => {
            assert_eq!(trigger, BackupTrigger::Elapsed);
            assert!(!outcome.is_replicated());
        }
        other => panic!("expected a backup, got {:?}", other),
    }
    assert!(!remote_folder(temp_dir.path()).exists());
    Ok(())
}

#[test]
fn test_backup_deferred_while_restore_runs() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let ctx = context(temp_dir.path(), HostClassifier::durable(), false)?;
    seeded_database(ctx.db.path(), 20)?;

    let job = job(&ctx);
    let start = Utc::now();
    let mut state = BackupState::starting_at(start, 0);

    let lock = RestoreLock::acquire(&ctx.state_dir)?;
    let tick = job.tick(&mut state, start)?;
    assert!(matches!(tick, BackupTick::Deferred));
    assert_eq!(state, BackupState::starting_at(start, 0));
    drop(lock);

    let tick = job.tick(&mut state, start)?;
    assert!(matches!(tick, BackupTick::Completed { .. }));
    Ok(())
}

#[test]
fn test_count_baseline_follows_a_shrunken_ledger() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let ctx = context(temp_dir.path(), HostClassifier::durable(), false)?;
    seeded_database(ctx.db.path(), 3)?;

    // Started with 40 records, then a restore brought the ledger down to 3
    let job = job(&ctx);
    let start = Utc::now();
    let mut state = BackupState::starting_at(start, 40);

    let tick = job.tick(&mut state, start + ChronoDuration::minutes(5))?;
    assert!(matches!(tick, BackupTick::Idle));
    assert_eq!(state.baseline_count, 3);

    insert_rows(&ctx.db, 3, 10)?;
    match job.tick(&mut state, start + ChronoDuration::minutes(10))? {
        BackupTick::Completed { trigger, outcome } => {
            assert_eq!(trigger, BackupTrigger::RecordCount);
            assert_eq!(outcome.snapshot.row_counts.ledger, 13);
        }
        other => panic!("expected a backup, got {:?}", other),
    }
    assert_eq!(state.baseline_count, 13);
    Ok(())
}

#[test]
fn test_retention_applies_to_automatic_backups() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = config_in(temp_dir.path(), false);
    config.retention.max_auto = 2;
    config.backup.count_threshold = 1;
    let ctx = SyncContext::with_classifier(config, HostClassifier::durable())?;
    seeded_database(ctx.db.path(), 0)?;
    ctx.replication.backup(SnapshotOrigin::Manual, false)?;

    let job = job(&ctx);
    let start = Utc::now();
    let mut state = BackupState::starting_at(start, 0);
    for i in 0..4 {
        insert_rows(&ctx.db, i, 1)?;
        job.tick(&mut state, start)?;
    }

    let snapshots = ctx.snapshots.list_snapshots()?;
    let auto = snapshots
        .iter()
        .filter(|s| s.origin == SnapshotOrigin::Auto)
        .count();
    assert_eq!(auto, 2);
    assert_eq!(snapshots.len(), 3);
    Ok(())
}
