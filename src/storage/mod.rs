//! Storage Module
//!
//! Persisted run state under `runs/`: the append-only trajectory log, the
//! router cache, and the advisory lock discipline both share.

pub mod file_lock;
pub mod router_cache;
pub mod trajectory_log;

pub use file_lock::FileLock;
pub use router_cache::{task_fingerprint, CacheEntry, RouterCache, DEFAULT_CACHE_CAP};
pub use trajectory_log::TrajectoryLog;
