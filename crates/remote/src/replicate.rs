//! Replication of local snapshots to the remote archive
//!
//! Local durability never depends on the remote: a snapshot is created first,
//! and replication is a separate step that may fail on its own.

use crate::client::RemoteClient;
use ledger_core::{Result, SyncError};
use ledger_journal::{SnapshotManager, SnapshotOrigin, SnapshotRef};
use serde::Serialize;
use std::sync::Arc;

/// Result of a local snapshot plus optional replication
#[derive(Debug)]
pub struct BackupOutcome {
    /// The local snapshot, updated with its remote id when replicated
    pub snapshot: SnapshotRef,
    /// Why replication did not happen, if it was attempted and failed
    pub replication_error: Option<SyncError>,
}

impl BackupOutcome {
    pub fn is_replicated(&self) -> bool {
        self.snapshot.is_replicated()
    }
}

/// Counts from a sync-all pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub uploaded: usize,
    pub failed: usize,
    /// Already replicated
    pub skipped: usize,
}

/// Snapshot manager decorated with remote replication
pub struct ReplicationService {
    snapshots: Arc<SnapshotManager>,
    remote: Arc<RemoteClient>,
}

impl ReplicationService {
    pub fn new(snapshots: Arc<SnapshotManager>, remote: Arc<RemoteClient>) -> Self {
        Self { snapshots, remote }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    pub fn remote(&self) -> &Arc<RemoteClient> {
        &self.remote
    }

    /// Upload a local snapshot and record its remote id.
    ///
    /// Metadata is only touched after the upload succeeded.
    pub fn replicate(&self, snapshot: &SnapshotRef) -> Result<SnapshotRef> {
        let remote_id = self.remote.upload(&snapshot.data_path)?;
        self.snapshots.mark_replicated(snapshot, &remote_id)
    }

    /// Take a local snapshot, then replicate it if asked and possible.
    ///
    /// Fails only if the local snapshot fails.
    pub fn backup(&self, origin: SnapshotOrigin, replicate: bool) -> Result<BackupOutcome> {
        let snapshot = self.snapshots.create_snapshot(origin)?;
        if !replicate || !self.remote.is_available() {
            return Ok(BackupOutcome {
                snapshot,
                replication_error: None,
            });
        }

        match self.replicate(&snapshot) {
            Ok(replicated) => Ok(BackupOutcome {
                snapshot: replicated,
                replication_error: None,
            }),
            Err(e) => {
                tracing::warn!(
                    "Snapshot {} kept locally, replication failed: {}",
                    snapshot.stem,
                    e
                );
                Ok(BackupOutcome {
                    snapshot,
                    replication_error: Some(e),
                })
            }
        }
    }

    /// Upload every local snapshot that has no remote id yet.
    ///
    /// Per-snapshot failures are logged and counted; the pass continues.
    pub fn sync_unreplicated(&self) -> Result<SyncSummary> {
        if !self.remote.is_available() {
            return Err(SyncError::Unavailable(
                "no remote archive configured".to_string(),
            ));
        }

        let mut summary = SyncSummary::default();
        for snapshot in self.snapshots.list_snapshots()? {
            if snapshot.is_replicated() {
                summary.skipped += 1;
                continue;
            }

            match self.replicate(&snapshot) {
                Ok(_) => summary.uploaded += 1,
                Err(e) => {
                    tracing::warn!("Failed to replicate {}: {}", snapshot.stem, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Remote sync: {} uploaded, {} failed, {} already replicated",
            summary.uploaded,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Delete a snapshot everywhere.
    ///
    /// The remote copy is removed best-effort; a remote failure never blocks
    /// the local delete. Returns whether a remote copy was removed.
    pub fn delete(&self, snapshot: &SnapshotRef) -> Result<bool> {
        let mut remote_deleted = false;
        if let Some(remote_id) = &snapshot.remote_id {
            if self.remote.is_available() {
                match self.remote.delete(remote_id) {
                    Ok(()) => remote_deleted = true,
                    Err(e) => tracing::warn!(
                        "Remote copy of {} not deleted: {}",
                        snapshot.stem,
                        e
                    ),
                }
            } else {
                tracing::warn!(
                    "Remote copy of {} left in place: archive unavailable",
                    snapshot.stem
                );
            }
        }

        self.snapshots.delete_snapshot(snapshot)?;
        Ok(remote_deleted)
    }
}
