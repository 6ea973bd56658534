//! Startup restore decision
//!
//! Decides once, before anything serves requests, whether the active database
//! must be populated and from where:
//!
//! - Volatile host: the local file cannot be trusted, so the newest remote
//!   snapshot is forced in. Any failure falls back to the local checks.
//! - Durable host: a file that already holds ledger records is authoritative
//!   and left alone. Otherwise the newest local snapshot is restored, then the
//!   newest remote one.
//!
//! The orchestrator only reads snapshots; it never deletes one.

use chrono::Utc;
use ledger_core::{HostClassifier, Result, RowCounts, SyncError};
use ledger_journal::SnapshotManager;
use ledger_remote::RemoteClient;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STAGING_DIR: &str = "staging";

/// States of the restore state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreState {
    Start,
    CheckEnvironment,
    ForceRemoteRestore,
    CheckLocalData,
    RestoreFromLocal,
    RestoreFromRemote,
    NoRestoreNeeded,
    NoBackupAvailable,
}

impl RestoreState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RestoreState::RestoreFromLocal
                | RestoreState::RestoreFromRemote
                | RestoreState::NoRestoreNeeded
                | RestoreState::NoBackupAvailable
        )
    }
}

/// What the orchestrator did
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Every state visited, in order
    pub trace: Vec<RestoreState>,
    pub outcome: RestoreState,
    pub volatile_host: bool,
    /// Snapshot name that was installed, if any
    pub source: Option<String>,
    pub row_counts: Option<RowCounts>,
    /// Failures that were absorbed along the way
    pub errors: Vec<String>,
}

impl RestoreReport {
    fn new() -> Self {
        Self {
            trace: vec![RestoreState::Start],
            outcome: RestoreState::Start,
            volatile_host: false,
            source: None,
            row_counts: None,
            errors: Vec::new(),
        }
    }

    fn enter(&mut self, state: RestoreState) {
        tracing::debug!("Restore: {:?}", state);
        self.trace.push(state);
        self.outcome = state;
    }

    fn absorb(&mut self, context: &str, error: SyncError) {
        tracing::warn!("Restore: {} failed ({}): {}", context, error.kind(), error);
        self.errors.push(format!("{}: {}", context, error.reason()));
    }

    pub fn restored(&self) -> bool {
        matches!(
            self.outcome,
            RestoreState::RestoreFromLocal | RestoreState::RestoreFromRemote
        )
    }
}

/// A restored snapshot's identity and resulting counts
struct Installed {
    source: String,
    row_counts: RowCounts,
}

pub struct RestoreOrchestrator {
    classifier: HostClassifier,
    snapshots: Arc<SnapshotManager>,
    remote: Arc<RemoteClient>,
    staging_dir: PathBuf,
}

impl RestoreOrchestrator {
    pub fn new(
        classifier: HostClassifier,
        snapshots: Arc<SnapshotManager>,
        remote: Arc<RemoteClient>,
        state_dir: &Path,
    ) -> Self {
        Self {
            classifier,
            snapshots,
            remote,
            staging_dir: state_dir.join(STAGING_DIR),
        }
    }

    /// Run the state machine to a terminal state. Never fails: problems are
    /// logged, recorded in the report, and the machine moves on.
    pub fn run(&self) -> RestoreReport {
        let mut report = RestoreReport::new();
        self.cleanup_staging();

        report.enter(RestoreState::CheckEnvironment);
        report.volatile_host = self.classifier.is_volatile_host();
        if let Some(indicator) = self.classifier.matched_indicator() {
            tracing::info!("Volatile host detected via {}", indicator);
        }

        let mut remote_attempted = false;
        if report.volatile_host {
            report.enter(RestoreState::ForceRemoteRestore);
            remote_attempted = true;
            match self.restore_from_remote() {
                Ok(installed) => return finish(report, RestoreState::RestoreFromRemote, installed),
                Err(e) => report.absorb("forced remote restore", e),
            }
        }

        report.enter(RestoreState::CheckLocalData);
        match self.snapshots.database().has_ledger_records() {
            Ok(true) => {
                tracing::info!("Active database already holds records, no restore needed");
                report.enter(RestoreState::NoRestoreNeeded);
                return report;
            }
            Ok(false) => {}
            Err(e) => report.absorb("reading active database", e),
        }

        match self.restore_from_local() {
            Ok(Some(installed)) => {
                return finish(report, RestoreState::RestoreFromLocal, installed)
            }
            Ok(None) => tracing::info!("No local snapshot available"),
            Err(e) => report.absorb("local restore", e),
        }

        if !remote_attempted {
            match self.restore_from_remote() {
                Ok(installed) => {
                    return finish(report, RestoreState::RestoreFromRemote, installed)
                }
                Err(e) => report.absorb("remote restore", e),
            }
        }

        tracing::warn!("No backup available, continuing with an empty database");
        report.enter(RestoreState::NoBackupAvailable);
        report
    }

    fn restore_from_local(&self) -> Result<Option<Installed>> {
        let Some(latest) = self.snapshots.latest()? else {
            return Ok(None);
        };
        let receipt = self.snapshots.restore_snapshot(&latest)?;
        Ok(Some(Installed {
            source: latest.filename(),
            row_counts: receipt.row_counts,
        }))
    }

    /// Download the newest remote snapshot and install it atomically
    fn restore_from_remote(&self) -> Result<Installed> {
        if !self.remote.is_available() {
            return Err(SyncError::Unavailable(
                "remote archive not configured".to_string(),
            ));
        }

        let newest = self
            .remote
            .list()?
            .into_iter()
            .find(|entry| !entry.id.is_empty() && entry.name.ends_with(".db"))
            .ok_or_else(|| SyncError::Restore("remote folder holds no snapshot".to_string()))?;

        let staged = self.staging_dir.join(format!(
            "remote_restore_{}.db",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        self.remote.download(&newest.id, &staged)?;

        let result = self.snapshots.import_database(&staged);
        if let Err(e) = std::fs::remove_file(&staged) {
            tracing::debug!("Could not remove staged download {}: {}", staged.display(), e);
        }
        let receipt = result?;

        Ok(Installed {
            source: newest.name,
            row_counts: receipt.row_counts,
        })
    }

    /// Remove downloads left behind by an interrupted run
    fn cleanup_staging(&self) {
        let Ok(entries) = std::fs::read_dir(&self.staging_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::info!("Removed incomplete download {}", path.display()),
                    Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }
    }
}

fn finish(mut report: RestoreReport, state: RestoreState, installed: Installed) -> RestoreReport {
    tracing::info!(
        "Restored {} ({:?}): {}",
        installed.source,
        state,
        installed.row_counts
    );
    report.enter(state);
    report.source = Some(installed.source);
    report.row_counts = Some(installed.row_counts);
    report
}
