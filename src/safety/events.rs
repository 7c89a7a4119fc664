//! Security event log
//!
//! Append-only JSONL record of security-relevant decisions: blocked code,
//! blocked shell commands, rate-limit hits. One object per line, written
//! as events occur so an external monitor can tail the file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    CodeExecutionBlocked,
    ShellCommandBlocked,
    RateLimitExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            details: serde_json::Value::Null,
            task_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Writer for `security_events.jsonl` under the run directory.
pub struct SecurityEventLog {
    path: PathBuf,
}

impl SecurityEventLog {
    pub fn new(run_dir: impl AsRef<Path>) -> Self {
        Self {
            path: run_dir.as_ref().join("security_events.jsonl"),
        }
    }

    /// Append one event. Logging failures are reported, never propagated:
    /// a broken audit log must not take down the run loop.
    pub fn record(&self, event: SecurityEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize security event");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to append security event");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_append_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = SecurityEventLog::new(dir.path());
        log.record(SecurityEvent::new(
            SecurityEventKind::CodeExecutionBlocked,
            Severity::High,
            "dangerous import: os",
        ));
        log.record(
            SecurityEvent::new(
                SecurityEventKind::RateLimitExceeded,
                Severity::Medium,
                "minute window exhausted",
            )
            .with_details(serde_json::json!({"window": "minute"})),
        );

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: SecurityEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.kind, SecurityEventKind::CodeExecutionBlocked);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["details"]["window"], "minute");
    }
}
