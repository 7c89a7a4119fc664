//! Trajectory log
//!
//! Append-only `trajectories.jsonl` under the run directory. One JSON
//! object per line, written under the advisory file lock. When the lock
//! cannot be acquired in time, the line is demoted to an in-process
//! buffer and drained on the next successful acquisition.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::CoevoError;
use crate::tasks::Trajectory;

use super::file_lock::FileLock;

pub struct TrajectoryLog {
    path: PathBuf,
    lock: FileLock,
    pending: VecDeque<String>,
}

impl TrajectoryLog {
    pub fn new(run_dir: impl AsRef<Path>) -> Result<Self> {
        let run_dir = run_dir.as_ref();
        std::fs::create_dir_all(run_dir)
            .with_context(|| format!("cannot create run dir {}", run_dir.display()))?;
        let path = run_dir.join("trajectories.jsonl");
        let lock = FileLock::for_target(&path);
        Ok(Self {
            path,
            lock,
            pending: VecDeque::new(),
        })
    }

    /// Append one trajectory. Lock contention buffers the line instead of
    /// failing the step; any other error propagates.
    pub async fn append(&mut self, trajectory: &Trajectory) -> Result<()> {
        let line = serde_json::to_string(trajectory).context("trajectory serialization")?;
        debug_assert!(!line.contains('\n'));
        self.pending.push_back(line);

        match self.lock.acquire().await {
            Ok(_guard) => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .with_context(|| format!("cannot open {}", self.path.display()))?;
                while let Some(buffered) = self.pending.front() {
                    writeln!(file, "{buffered}").context("trajectory write")?;
                    self.pending.pop_front();
                }
                Ok(())
            }
            Err(CoevoError::LockContention { path }) => {
                warn!(
                    path = %path,
                    buffered = self.pending.len(),
                    "trajectory write deferred under lock contention"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TrajectoryLog {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            info!(
                buffered = self.pending.len(),
                "trajectory log dropped with undrained writes"
            );
        }
    }
}
