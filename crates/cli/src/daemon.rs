//! Daemon lifecycle and the two background loops
//!
//! Startup runs the restore decision before anything is served. Afterwards the
//! backup loop and the sync loop run independently next to the HTTP surface.
//! A failed iteration is logged and the loop waits for its next wake-up.

use crate::context::SyncContext;
use crate::locks::{DaemonLock, RestoreLock};
use crate::recovery::{RestoreOrchestrator, RestoreReport};
use crate::server::{self, AppState};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ledger_core::{Database, HostClassifier};
use ledger_journal::SnapshotOrigin;
use ledger_remote::{BackupOutcome, ReplicationService};
use ledger_watcher::{ChangeDetector, Notifier};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// When the backup loop wakes up and what makes it take a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPolicy {
    pub poll_interval: Duration,
    pub volatile_interval: Duration,
    pub durable_interval: Duration,
    pub count_threshold: u64,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            volatile_interval: Duration::from_secs(60),
            durable_interval: Duration::from_secs(43200),
            count_threshold: 10,
        }
    }
}

/// Why a backup was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTrigger {
    Elapsed,
    RecordCount,
}

/// Baselines owned by the backup loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupState {
    pub last_backup: DateTime<Utc>,
    pub baseline_count: u64,
}

impl BackupState {
    pub fn starting_at(now: DateTime<Utc>, baseline_count: u64) -> Self {
        Self {
            last_backup: now,
            baseline_count,
        }
    }
}

impl BackupPolicy {
    pub fn interval_for(&self, volatile_host: bool) -> Duration {
        if volatile_host {
            self.volatile_interval
        } else {
            self.durable_interval
        }
    }

    /// Decide whether to back up now.
    ///
    /// `ledger_count` is `None` when the count could not be read; only the
    /// time trigger is evaluated then. The count trigger wins when both fire.
    pub fn evaluate(
        &self,
        state: &BackupState,
        now: DateTime<Utc>,
        ledger_count: Option<u64>,
        volatile_host: bool,
    ) -> Option<BackupTrigger> {
        if let Some(count) = ledger_count {
            if count.saturating_sub(state.baseline_count) >= self.count_threshold {
                return Some(BackupTrigger::RecordCount);
            }
        }

        // A clock that went backwards reads as zero elapsed
        let elapsed = (now - state.last_backup).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= self.interval_for(volatile_host) {
            return Some(BackupTrigger::Elapsed);
        }

        None
    }
}

/// Result of one backup-loop iteration
#[derive(Debug)]
pub enum BackupTick {
    /// No trigger fired
    Idle,
    /// A manual restore holds the restore lock
    Deferred,
    Completed {
        trigger: BackupTrigger,
        outcome: BackupOutcome,
    },
}

/// One backup-loop iteration, independent of any runtime
pub struct BackupJob {
    policy: BackupPolicy,
    classifier: HostClassifier,
    replication: Arc<ReplicationService>,
    state_dir: PathBuf,
}

impl BackupJob {
    pub fn new(
        policy: BackupPolicy,
        classifier: HostClassifier,
        replication: Arc<ReplicationService>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            policy,
            classifier,
            replication,
            state_dir: state_dir.into(),
        }
    }

    pub fn policy(&self) -> &BackupPolicy {
        &self.policy
    }

    /// Evaluate the triggers and back up if one fires.
    ///
    /// Baselines are reset only after a successful local snapshot; a failed
    /// upload does not count as a failed backup.
    pub fn tick(&self, state: &mut BackupState, now: DateTime<Utc>) -> ledger_core::Result<BackupTick> {
        if RestoreLock::is_held(&self.state_dir) {
            tracing::info!("Restore in progress, skipping backup check");
            return Ok(BackupTick::Deferred);
        }

        let db = self.replication.snapshots().database();
        let ledger_count = match db.ledger_count() {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Could not count ledger records: {}", e);
                None
            }
        };

        // A restore or import shrank the ledger: count new records from here
        if let Some(count) = ledger_count.filter(|count| *count < state.baseline_count) {
            tracing::info!(
                "Ledger shrank from {} to {} records, moving count baseline",
                state.baseline_count,
                count
            );
            state.baseline_count = count;
        }

        let volatile_host = self.classifier.is_volatile_host();
        let Some(trigger) = self.policy.evaluate(state, now, ledger_count, volatile_host) else {
            return Ok(BackupTick::Idle);
        };

        match trigger {
            BackupTrigger::Elapsed => tracing::info!(
                "Automatic backup: {}s since last backup",
                (now - state.last_backup).num_seconds()
            ),
            BackupTrigger::RecordCount => tracing::info!(
                "Automatic backup: {} new ledger records",
                ledger_count.unwrap_or(0).saturating_sub(state.baseline_count)
            ),
        }

        let replicate = volatile_host && self.replication.remote().is_available();
        let outcome = self.replication.backup(SnapshotOrigin::Auto, replicate)?;

        tracing::info!(
            "Created {} ({})",
            outcome.snapshot.filename(),
            outcome.snapshot.row_counts
        );
        if let Some(e) = &outcome.replication_error {
            tracing::warn!("Snapshot {} kept local only: {}", outcome.snapshot.filename(), e);
        }

        state.last_backup = now;
        state.baseline_count = ledger_count.unwrap_or(outcome.snapshot.row_counts.ledger);
        Ok(BackupTick::Completed { trigger, outcome })
    }
}

/// Daemon state shared with the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub started_at: DateTime<Utc>,
    pub last_backup: Option<DateTime<Utc>>,
    pub last_backup_name: Option<String>,
    pub backups_created: u64,
    pub last_error: Option<String>,
    pub restore: Option<RestoreReport>,
}

impl SyncStatus {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_backup: None,
            last_backup_name: None,
            backups_created: 0,
            last_error: None,
            restore: None,
        }
    }
}

pub type SharedStatus = Arc<RwLock<SyncStatus>>;

/// Backup loop: sleep, then run one job iteration on the blocking pool
pub async fn run_backup_loop(
    job: Arc<BackupJob>,
    mut state: BackupState,
    status: SharedStatus,
    mut shutdown: broadcast::Receiver<()>,
) {
    let poll = job.policy().poll_interval;
    tracing::info!("Backup loop started (poll every {}s)", poll.as_secs());

    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = shutdown.recv() => {
                tracing::info!("Backup loop stopping");
                break;
            }
        }

        let worker = Arc::clone(&job);
        let mut next = state;
        let result = tokio::task::spawn_blocking(move || {
            let tick = worker.tick(&mut next, Utc::now());
            (next, tick)
        })
        .await;

        match result {
            Ok((next, Ok(tick))) => {
                state = next;
                if let BackupTick::Completed { outcome, .. } = tick {
                    let mut status = status.write().await;
                    status.last_backup = Some(outcome.snapshot.created_at);
                    status.last_backup_name = Some(outcome.snapshot.filename());
                    status.backups_created += 1;
                    status.last_error = outcome.replication_error.map(|e| e.reason());
                }
            }
            Ok((_, Err(e))) => {
                tracing::error!("Automatic backup failed ({}): {}", e.kind(), e);
                status.write().await.last_error = Some(e.reason());
            }
            Err(e) => tracing::error!("Backup task aborted: {}", e),
        }
    }
}

/// Sync loop: fingerprint the database and publish on change
pub async fn run_sync_loop(
    db: Database,
    mut detector: ChangeDetector,
    notifier: Notifier,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("Sync loop started (every {}s)", interval.as_secs());

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => {
                tracing::info!("Sync loop stopping");
                break;
            }
        }

        let hub = notifier.clone();
        let result = tokio::task::spawn_blocking(move || {
            let tick = detector.tick(&hub);
            (detector, tick)
        })
        .await;

        detector = match result {
            Ok((returned, tick)) => {
                if let Err(e) = tick {
                    tracing::warn!("Change detection failed: {}", e);
                }
                returned
            }
            Err(e) => {
                // The baseline is lost; the next tick re-adopts one
                tracing::error!("Change detection task aborted: {}", e);
                ChangeDetector::new(db.clone())
            }
        };
    }
}

/// Run the daemon until SIGINT/SIGTERM.
///
/// Blocking setup happens here, outside the runtime; only the loops and the
/// server run inside it.
pub fn serve(ctx: SyncContext) -> Result<()> {
    std::fs::create_dir_all(&ctx.state_dir).with_context(|| {
        format!("Failed to create state directory {}", ctx.state_dir.display())
    })?;
    let lock = DaemonLock::acquire(&ctx.state_dir).context("Failed to acquire daemon lock")?;
    tracing::info!("Daemon starting (PID: {})", std::process::id());

    // Nothing is served against a file that has not been through restore
    let orchestrator = RestoreOrchestrator::new(
        ctx.classifier.clone(),
        ctx.snapshots.clone(),
        ctx.remote.clone(),
        &ctx.state_dir,
    );
    let report = orchestrator.run();
    tracing::info!("Startup restore finished: {:?}", report.outcome);

    ctx.db.init_schema().context("Failed to create schema")?;
    ctx.db
        .seed_default_objects()
        .context("Failed to seed lookup table")?;

    let now = Utc::now();
    let baseline_count = ctx.db.ledger_count().unwrap_or_else(|e| {
        tracing::warn!("Could not count ledger records: {}", e);
        0
    });
    let backup_state = BackupState::starting_at(now, baseline_count);

    let mut detector = ChangeDetector::new(ctx.db.clone());
    match detector.prime() {
        Ok(fingerprint) => tracing::info!("Initial fingerprint {}", fingerprint),
        Err(e) => tracing::warn!("Could not compute initial fingerprint: {}", e),
    }

    let mut status = SyncStatus::new(now);
    status.restore = Some(report);
    let status: SharedStatus = Arc::new(RwLock::new(status));

    let notifier = Notifier::new(ctx.config.sync.channel_capacity);
    let job = Arc::new(BackupJob::new(
        ctx.config.backup.to_policy(),
        ctx.classifier.clone(),
        ctx.replication.clone(),
        ctx.state_dir.clone(),
    ));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let app = AppState {
        db: ctx.db.clone(),
        notifier: notifier.clone(),
        status: status.clone(),
        volatile_host: ctx.classifier.is_volatile_host(),
        remote_available: ctx.remote.is_available(),
        shutdown: shutdown_tx.clone(),
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(async {
        let backup = tokio::spawn(run_backup_loop(
            job,
            backup_state,
            status,
            shutdown_tx.subscribe(),
        ));
        let sync = tokio::spawn(run_sync_loop(
            ctx.db.clone(),
            detector,
            notifier,
            ctx.config.sync.interval(),
            shutdown_tx.subscribe(),
        ));

        let signal_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            let _ = signal_tx.send(());
        });

        let served = server::run(&ctx.config.server.bind, app, shutdown_tx.subscribe()).await;

        // Stop the loops even if the server failed to start
        let _ = shutdown_tx.send(());
        let _ = tokio::join!(backup, sync);
        served
    });

    drop(runtime);
    drop(lock);
    tracing::info!("Shutdown complete");
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            _ => {
                tracing::warn!("Could not install signal handlers, waiting for Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received Ctrl-C, shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn policy() -> BackupPolicy {
        BackupPolicy::default()
    }

    #[test]
    fn test_count_trigger_threshold() {
        let now = Utc::now();
        let state = BackupState::starting_at(now, 20);

        assert_eq!(policy().evaluate(&state, now, Some(29), false), None);
        assert_eq!(
            policy().evaluate(&state, now, Some(30), false),
            Some(BackupTrigger::RecordCount)
        );
    }

    #[test]
    fn test_time_trigger_depends_on_host() {
        let start = Utc::now();
        let state = BackupState::starting_at(start, 0);
        let later = start + ChronoDuration::seconds(61);

        assert_eq!(
            policy().evaluate(&state, later, Some(0), true),
            Some(BackupTrigger::Elapsed)
        );
        assert_eq!(policy().evaluate(&state, later, Some(0), false), None);

        let much_later = start + ChronoDuration::hours(12);
        assert_eq!(
            policy().evaluate(&state, much_later, Some(0), false),
            Some(BackupTrigger::Elapsed)
        );
    }

    #[test]
    fn test_shrinking_table_never_triggers_count() {
        let now = Utc::now();
        let state = BackupState::starting_at(now, 50);
        assert_eq!(policy().evaluate(&state, now, Some(3), false), None);
    }

    #[test]
    fn test_unreadable_count_falls_back_to_time() {
        let start = Utc::now();
        let state = BackupState::starting_at(start, 0);
        assert_eq!(policy().evaluate(&state, start, None, true), None);
        assert_eq!(
            policy().evaluate(&state, start + ChronoDuration::seconds(60), None, true),
            Some(BackupTrigger::Elapsed)
        );
    }

    #[test]
    fn test_clock_going_backwards_is_not_elapsed() {
        let start = Utc::now();
        let state = BackupState::starting_at(start, 0);
        let earlier = start - ChronoDuration::hours(24);
        assert_eq!(policy().evaluate(&state, earlier, Some(0), true), None);
    }
}
