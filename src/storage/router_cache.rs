//! Router cache
//!
//! `router_cache.json`: a fingerprint-keyed map of previously served
//! results, maintained by the external router. Capped with LRU eviction
//! on write; never read during an evolution step. Writes go through the
//! same lock discipline as the trajectory log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::Task;
use crate::utils::stable_hash;

use super::file_lock::FileLock;

pub const DEFAULT_CACHE_CAP: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: String,
    pub confidence: f64,
    /// Last-used time; doubles as the LRU eviction key.
    pub timestamp: DateTime<Utc>,
}

/// Stable fingerprint of a task for cache keying.
pub fn task_fingerprint(task: &Task) -> String {
    format!("{}:{:016x}", task.domain, stable_hash(&task.prompt))
}

pub struct RouterCache {
    path: PathBuf,
    cap: usize,
}

impl RouterCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cap: DEFAULT_CACHE_CAP,
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap.max(1);
        self
    }

    /// Lock-free read; the cache is only consulted between steps.
    pub fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let map = self.load().ok()?;
        map.get(fingerprint).cloned()
    }

    /// Insert under the file lock, evicting least-recently-used entries
    /// past the cap.
    pub async fn put(&self, fingerprint: &str, entry: CacheEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let lock = FileLock::for_target(&self.path);
        let _guard = lock
            .acquire()
            .await
            .map_err(|e| anyhow::anyhow!("router cache lock: {e}"))?;

        let mut map = self.load().unwrap_or_default();
        map.insert(fingerprint.to_string(), entry);
        while map.len() > self.cap {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    map.remove(&key);
                }
                None => break,
            }
        }

        let serialized = serde_json::to_string(&map).context("router cache serialization")?;
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("cannot write {}", self.path.display()))?;
        Ok(())
    }

    fn load(&self) -> Result<BTreeMap<String, CacheEntry>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        Ok(serde_json::from_str(&contents).unwrap_or_default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
