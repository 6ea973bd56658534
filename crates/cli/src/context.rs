//! Component wiring from configuration

use crate::system_config::{LedgerConfig, RemoteBackend, RemoteConfig};
use anyhow::Result;
use ledger_core::{Database, HostClassifier};
use ledger_journal::SnapshotManager;
use ledger_remote::{Credentials, DirArchive, DriveArchive, RemoteClient, ReplicationService};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command or the daemon needs, built once per process.
///
/// Holds a blocking HTTP client when the drive backend is configured, so it
/// must be built and dropped outside an async context.
pub struct SyncContext {
    pub config: LedgerConfig,
    pub classifier: HostClassifier,
    pub db: Database,
    pub snapshots: Arc<SnapshotManager>,
    pub remote: Arc<RemoteClient>,
    pub replication: Arc<ReplicationService>,
    pub state_dir: PathBuf,
}

impl SyncContext {
    pub fn from_config(config: LedgerConfig) -> Result<Self> {
        Self::with_classifier(config, HostClassifier::from_process())
    }

    pub fn with_classifier(config: LedgerConfig, classifier: HostClassifier) -> Result<Self> {
        let remote = Arc::new(build_remote(&config.remote));
        Ok(Self::assemble(config, classifier, remote))
    }

    /// Wire components around an already built remote client
    pub fn assemble(
        config: LedgerConfig,
        classifier: HostClassifier,
        remote: Arc<RemoteClient>,
    ) -> Self {
        let db = Database::new(&config.paths.database);
        let snapshots = Arc::new(
            SnapshotManager::new(&config.paths.snapshot_dir, db.clone())
                .with_prefix(config.paths.snapshot_prefix.clone())
                .with_policy(config.retention.to_policy()),
        );
        let replication = Arc::new(ReplicationService::new(snapshots.clone(), remote.clone()));
        let state_dir = config.paths.state_dir.clone();

        Self {
            config,
            classifier,
            db,
            snapshots,
            remote,
            replication,
            state_dir,
        }
    }
}

/// Build the remote client, degrading to "unavailable" on any setup problem
pub fn build_remote(config: &RemoteConfig) -> RemoteClient {
    match config.backend {
        RemoteBackend::None => RemoteClient::unavailable("remote backend disabled"),
        RemoteBackend::Directory => match &config.directory {
            Some(root) => {
                RemoteClient::new(Arc::new(DirArchive::new(root)), config.folder_name.clone())
            }
            None => {
                tracing::warn!("Directory backend selected but no directory configured");
                RemoteClient::unavailable("no archive directory configured")
            }
        },
        RemoteBackend::Drive => {
            match Credentials::load(&config.credentials_path, &config.credentials_env) {
                Ok(Some(credentials)) => match DriveArchive::new(credentials, config.timeouts()) {
                    Ok(drive) => RemoteClient::new(Arc::new(drive), config.folder_name.clone()),
                    Err(e) => {
                        tracing::warn!("Remote archive unavailable: {}", e);
                        RemoteClient::unavailable(e.reason())
                    }
                },
                Ok(None) => {
                    tracing::warn!(
                        "No remote credentials in ${} or {}",
                        config.credentials_env,
                        config.credentials_path.display()
                    );
                    RemoteClient::unavailable("no stored credentials")
                }
                Err(e) => {
                    tracing::warn!("Remote archive unavailable: {}", e);
                    RemoteClient::unavailable(e.reason())
                }
            }
        }
    }
}
