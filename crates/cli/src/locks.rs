//! Lock files for daemon exclusivity and manual restores

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const DAEMON_LOCK: &str = "locks/daemon.lock";
const RESTORE_LOCK: &str = "locks/restore.lock";

/// Held by the running daemon; one daemon per database
pub struct DaemonLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: String,
}

impl DaemonLock {
    /// Acquire exclusive daemon lock
    ///
    /// Fails if another live process holds it. A lock left behind by a dead
    /// process is removed and retried once.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        Self::acquire_inner(state_dir, true)
    }

    fn acquire_inner(state_dir: &Path, retry_stale: bool) -> Result<Self> {
        let lock_path = state_dir.join(DAEMON_LOCK);
        let mut file = open_lock_file(&lock_path)?;

        if !try_flock_exclusive(&file)? {
            if retry_stale && Self::is_stale_lock(&mut file) {
                tracing::warn!("Removing stale daemon lock");
                drop(file);
                std::fs::remove_file(&lock_path)?;
                return Self::acquire_inner(state_dir, false);
            }
            anyhow::bail!("Daemon already running (lock file held by active process)");
        }

        Self::write_lock_content(&mut file)?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }

    /// PID of the daemon holding the lock, if any
    pub fn holder(state_dir: &Path) -> Option<u32> {
        let lock_path = state_dir.join(DAEMON_LOCK);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&lock_path)
            .ok()?;
        match try_flock_exclusive(&file) {
            Ok(false) => Self::read_lock_content(&mut file).ok().map(|c| c.pid),
            _ => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_stale_lock(file: &mut File) -> bool {
        match Self::read_lock_content(file) {
            Ok(content) => !is_process_alive(content.pid),
            Err(_) => true,
        }
    }

    fn write_lock_content(file: &mut File) -> Result<()> {
        let content = LockContent {
            pid: std::process::id(),
            started_at: chrono::Utc::now().to_rfc3339(),
        };
        let serialized =
            serde_json::to_string(&content).context("Failed to serialize lock content")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_lock_content(file: &mut File) -> Result<LockContent> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        serde_json::from_str(&contents).context("Failed to deserialize lock content")
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Held while a manual restore or import replaces the active database.
///
/// The backup loop skips its iteration while this is held, so it never
/// snapshots a half-installed file.
pub struct RestoreLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl RestoreLock {
    /// Acquire restore lock (non-blocking, fails if already held)
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        let lock_path = state_dir.join(RESTORE_LOCK);
        let mut file = open_lock_file(&lock_path)?;

        if !try_flock_exclusive(&file)? {
            anyhow::bail!("Another restore operation is in progress");
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }

    /// Check if a restore is in progress
    pub fn is_held(state_dir: &Path) -> bool {
        let lock_path = state_dir.join(RESTORE_LOCK);
        if !lock_path.exists() {
            return false;
        }

        match OpenOptions::new().read(true).write(true).open(&lock_path) {
            Ok(file) => match try_flock_exclusive(&file) {
                Ok(acquired) => !acquired,
                Err(_) => true,
            },
            // Removed between the check and the open: released
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(_) => true,
        }
    }
}

impl Drop for RestoreLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create locks directory")?;
    }

    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

#[cfg(target_os = "macos")]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
