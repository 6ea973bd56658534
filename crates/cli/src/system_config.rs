//! Daemon configuration
//!
//! Looked up in order: an explicit `--config` path, `./ledger.toml`, then
//! `~/.config/ledgerd/config.toml` (Linux/macOS) or `%APPDATA%\ledgerd\config.toml`
//! (Windows). Every section is optional; missing values take the defaults below.

use anyhow::{Context, Result};
use ledger_journal::RetentionPolicy;
use ledger_remote::HttpTimeouts;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "ledger.toml";

/// Effective daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub paths: PathsConfig,
    pub backup: BackupConfig,
    pub sync: SyncConfig,
    pub retention: RetentionConfig,
    pub remote: RemoteConfig,
    pub server: ServerConfig,
}

/// File locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Active database file (default: finance.db)
    pub database: PathBuf,

    /// Local snapshot directory (default: backups)
    pub snapshot_dir: PathBuf,

    /// Snapshot file stem prefix (default: finance_backup)
    pub snapshot_prefix: String,

    /// Lock files and restore staging (default: .ledgerd)
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("finance.db"),
            snapshot_dir: PathBuf::from("backups"),
            snapshot_prefix: ledger_journal::DEFAULT_PREFIX.to_string(),
            state_dir: PathBuf::from(".ledgerd"),
        }
    }
}

/// Backup loop schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// How often the loop wakes up (default: 300)
    pub poll_interval_secs: u64,

    /// Time trigger on a volatile host (default: 60)
    pub volatile_interval_secs: u64,

    /// Time trigger on a durable host (default: 43200 = 12 hours)
    pub durable_interval_secs: u64,

    /// New ledger records that force a backup (default: 10)
    pub count_threshold: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            volatile_interval_secs: 60,
            durable_interval_secs: 43200,
            count_threshold: 10,
        }
    }
}

impl BackupConfig {
    pub fn to_policy(&self) -> crate::daemon::BackupPolicy {
        crate::daemon::BackupPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            volatile_interval: Duration::from_secs(self.volatile_interval_secs),
            durable_interval: Duration::from_secs(self.durable_interval_secs),
            count_threshold: self.count_threshold,
        }
    }
}

/// Change detection loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fingerprint check interval in seconds (default: 30)
    pub interval_secs: u64,

    /// Buffered events per subscriber (default: 64)
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            channel_capacity: ledger_watcher::DEFAULT_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Snapshot retention caps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Automatic snapshots kept (default: 5)
    pub max_auto: usize,

    /// Manual snapshots kept (default: 200)
    pub max_manual: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let policy = RetentionPolicy::default();
        Self {
            max_auto: policy.max_auto,
            max_manual: policy.max_manual,
        }
    }
}

impl RetentionConfig {
    pub fn to_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_auto: self.max_auto,
            max_manual: self.max_manual,
        }
    }
}

/// Which remote archive backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    #[default]
    None,
    Drive,
    Directory,
}

/// Remote archive settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,

    /// Folder located by exact name, created once if absent
    pub folder_name: String,

    /// Root for the directory backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Stored OAuth credentials (drive backend)
    pub credentials_path: PathBuf,

    /// Environment variable holding the credentials JSON, checked first
    pub credentials_env: String,

    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let timeouts = HttpTimeouts::default();
        Self {
            backend: RemoteBackend::None,
            folder_name: ledger_remote::DEFAULT_FOLDER_NAME.to_string(),
            directory: None,
            credentials_path: PathBuf::from("gdrive_token.json"),
            credentials_env: "GDRIVE_TOKEN".to_string(),
            connect_timeout_secs: timeouts.connect.as_secs(),
            timeout_secs: timeouts.overall.as_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            overall: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Event and status HTTP surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Get the per-user config directory
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join(".config/ledgerd"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        dirs::config_dir().map(|c| c.join("ledgerd"))
    }
}

/// Get the per-user config file path
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Pick the config file to read, if any
pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    config_file_path().filter(|p| p.is_file())
}

/// Load configuration.
///
/// An explicit path must exist; otherwise a missing file means defaults.
pub fn load(explicit: Option<&Path>) -> Result<(LedgerConfig, Option<PathBuf>)> {
    let Some(path) = locate(explicit) else {
        tracing::debug!("No config file found, using defaults");
        return Ok((LedgerConfig::default(), None));
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let config = LedgerConfig::from_toml(&content)
        .with_context(|| format!("Invalid config at {}", path.display()))?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok((config, Some(path)))
}
