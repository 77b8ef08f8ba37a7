//! Advisory write lock on the state file.
//!
//! The lock is a file created with `create_new`, holding the owner's pid and
//! acquisition time as JSON. Holders release it by dropping the guard. A lock
//! left behind by a process that no longer runs is removed and acquisition is
//! retried once; a live holder makes acquisition fail immediately.

use crate::error::{PrismError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Held lock. Removing the file on drop releases it.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    info: LockInfo,
}

impl LockGuard {
    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "released lock"),
            Err(e) => tracing::warn!(path = %self.path.display(), "failed to release lock: {e}"),
        }
    }
}

/// Take the project's write lock or fail with `Concurrency`.
pub fn acquire(root: &Path) -> Result<LockGuard> {
    let path = paths::lock_path(root);
    match try_acquire(&path)? {
        Attempt::Acquired(guard) => Ok(guard),
        Attempt::Held(info) => Err(held(info)),
        Attempt::Stale(info) => {
            tracing::warn!(
                pid = info.pid,
                acquired_at = %info.acquired_at,
                "removing stale lock left by a process that is no longer running"
            );
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            match try_acquire(&path)? {
                Attempt::Acquired(guard) => Ok(guard),
                Attempt::Held(info) | Attempt::Stale(info) => Err(held(info)),
            }
        }
    }
}

enum Attempt {
    Acquired(LockGuard),
    Held(LockInfo),
    Stale(LockInfo),
}

fn try_acquire(path: &Path) -> Result<Attempt> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match OpenOptions::new().create_new(true).write(true).open(path) {
        Ok(mut file) => {
            let info = LockInfo {
                pid: std::process::id(),
                acquired_at: Utc::now(),
            };
            let body = serde_json::to_vec(&info)?;
            if let Err(e) = file.write_all(&body).and_then(|_| file.sync_all()) {
                let _ = std::fs::remove_file(path);
                return Err(e.into());
            }
            tracing::debug!(path = %path.display(), pid = info.pid, "acquired lock");
            Ok(Attempt::Acquired(LockGuard {
                path: path.to_path_buf(),
                info,
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // Unreadable contents: another writer may be between create and
            // write, so treat it as held.
            let Some(info) = read_info(path) else {
                return Ok(Attempt::Held(LockInfo {
                    pid: 0,
                    acquired_at: modified_at(path),
                }));
            };
            if is_pid_alive(info.pid) {
                Ok(Attempt::Held(info))
            } else {
                Ok(Attempt::Stale(info))
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(data.trim()).ok()
}

fn modified_at(path: &Path) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

fn held(info: LockInfo) -> PrismError {
    PrismError::Concurrency {
        pid: info.pid,
        acquired_at: info.acquired_at,
    }
}

/// Returns true if the process is still alive (`kill -0 {pid}`).
fn is_pid_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        // No portable liveness probe: never treat a lock as stale.
        let _ = pid;
        true
    }
}
