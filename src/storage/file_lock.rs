//! Advisory file locking
//!
//! Lock-file discipline for the process-shared files (trajectory log,
//! router cache): bounded acquisition with polling, and automatic removal
//! of stale lock files left behind by a dead process.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::CoevoError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct FileLock {
    lock_path: PathBuf,
    acquire_timeout: Duration,
    stale_after: Duration,
}

impl FileLock {
    /// Lock guarding `target` (the lock file lives next to it).
    pub fn for_target(target: &Path) -> Self {
        let mut name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        name.push_str(".lock");
        Self {
            lock_path: target.with_file_name(name),
            acquire_timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(60),
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Acquire the lock, polling up to the timeout. A lock file older
    /// than the staleness bound is treated as abandoned and removed.
    pub async fn acquire(&self) -> Result<LockGuard, CoevoError> {
        let started = std::time::Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    debug!(path = %self.lock_path.display(), "acquired file lock");
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    self.reap_stale();
                    if started.elapsed() >= self.acquire_timeout {
                        return Err(CoevoError::LockContention {
                            path: self.lock_path.display().to_string(),
                        });
                    }
                    sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    warn!(path = %self.lock_path.display(), error = %e, "lock file error");
                    return Err(CoevoError::LockContention {
                        path: self.lock_path.display().to_string(),
                    });
                }
            }
        }
    }

    fn reap_stale(&self) {
        let age = std::fs::metadata(&self.lock_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        if let Some(age) = age {
            if age > self.stale_after {
                warn!(path = %self.lock_path.display(), ?age, "removing stale lock file");
                let _ = std::fs::remove_file(&self.lock_path);
            }
        }
    }
}

/// Held lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release file lock");
        }
    }
}
