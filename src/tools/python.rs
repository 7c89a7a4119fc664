//! Python Tool
//!
//! Executes short Python programs in a subprocess with a wall-clock
//! timeout. Every input passes the code review gate first; a rejected
//! review yields a blocked outcome and a security event, and nothing is
//! spawned.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::safety::{self, SecurityEvent, SecurityEventKind, SecurityEventLog, Severity};
use crate::tasks::ToolStatus;
use crate::utils::truncate_text;

use super::{Tool, ToolContext, ToolOutcome};

pub struct PythonTool {
    events: Option<Arc<SecurityEventLog>>,
}

impl PythonTool {
    pub fn new(events: Option<Arc<SecurityEventLog>>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Tool for PythonTool {
    fn name(&self) -> &'static str {
        "python"
    }

    fn description(&self) -> &'static str {
        "Execute a short Python program; stdout is captured and the final line becomes the result"
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolOutcome {
        let report = safety::review(input);
        if !report.safe {
            warn!(issues = ?report.issues, "code review blocked python execution");
            if let Some(events) = &self.events {
                events.record(
                    SecurityEvent::new(
                        SecurityEventKind::CodeExecutionBlocked,
                        Severity::High,
                        report.rationale(),
                    )
                    .with_details(serde_json::json!({ "issues": report.issues })),
                );
            }
            return ToolOutcome::blocked(report.rationale());
        }
        if !report.warnings.is_empty() {
            debug!(warnings = ?report.warnings, "code review warnings");
        }

        run_python(input, ctx).await
    }
}

/// Spawn `python3 -c <code>` under the context's timeout and output caps.
pub(crate) async fn run_python(code: &str, ctx: &ToolContext) -> ToolOutcome {
    if let Err(e) = std::fs::create_dir_all(&ctx.workdir) {
        return ToolOutcome::error(format!("cannot create workdir: {e}"));
    }

    let spawned = Command::new("python3")
        .arg("-c")
        .arg(code)
        .current_dir(&ctx.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    match timeout(ctx.timeout, spawned).await {
        Ok(Ok(output)) => {
            let max_bytes = ctx.max_output_kb * 1024;
            let stdout = truncate_text(&String::from_utf8_lossy(&output.stdout), max_bytes);
            let stderr = truncate_text(&String::from_utf8_lossy(&output.stderr), max_bytes);
            let result = stdout
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("")
                .trim()
                .to_string();
            if output.status.success() {
                ToolOutcome {
                    status: ToolStatus::Ok,
                    result,
                    stdout,
                    stderr,
                    elapsed_ms: 0,
                }
            } else {
                ToolOutcome {
                    status: ToolStatus::Error,
                    result,
                    stdout,
                    stderr,
                    elapsed_ms: 0,
                }
            }
        }
        Ok(Err(e)) => ToolOutcome::error(format!("failed to spawn python3: {e}")),
        Err(_) => ToolOutcome::timeout(ctx.timeout.as_secs()),
    }
}
