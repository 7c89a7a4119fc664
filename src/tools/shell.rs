//! Shell Tool
//!
//! Disabled by default. When enabled, the command head must appear in the
//! allowlist and the command must be free of shell metacharacters; the
//! command then runs directly (argv, no shell), so there is nothing for a
//! stray operator to expand.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use crate::safety::{SecurityEvent, SecurityEventKind, SecurityEventLog, Severity};
use crate::tasks::ToolStatus;
use crate::utils::truncate_text;

use super::{Tool, ToolContext, ToolOutcome};

const FORBIDDEN_FRAGMENTS: &[&str] = &[";", "&", "|", "`", "$(", ">", "<"];

pub struct ShellTool {
    allowed: Vec<String>,
    events: Option<Arc<SecurityEventLog>>,
}

impl ShellTool {
    pub fn new(allowed: Vec<String>, events: Option<Arc<SecurityEventLog>>) -> Self {
        Self { allowed, events }
    }

    fn check(&self, command: &str) -> Result<Vec<String>, String> {
        for fragment in FORBIDDEN_FRAGMENTS {
            if command.contains(fragment) {
                return Err(format!("forbidden shell metacharacter `{fragment}`"));
            }
        }
        let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        let head = argv.first().ok_or_else(|| "empty command".to_string())?;
        // Allow full paths by matching on the basename.
        let base = head.rsplit('/').next().unwrap_or(head);
        if !self.allowed.iter().any(|a| a == base) {
            return Err(format!("command `{base}` not in allowlist"));
        }
        Ok(argv)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn description(&self) -> &'static str {
        "Run an allowlisted command without shell interpretation"
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolOutcome {
        let argv = match self.check(input.trim()) {
            Ok(argv) => argv,
            Err(reason) => {
                warn!(command = input, reason = %reason, "shell command blocked");
                if let Some(events) = &self.events {
                    events.record(
                        SecurityEvent::new(
                            SecurityEventKind::ShellCommandBlocked,
                            Severity::High,
                            reason.clone(),
                        )
                        .with_details(serde_json::json!({ "command": input })),
                    );
                }
                return ToolOutcome::blocked(reason);
            }
        };

        if let Err(e) = std::fs::create_dir_all(&ctx.workdir) {
            return ToolOutcome::error(format!("cannot create workdir: {e}"));
        }

        let spawned = Command::new(&argv[0])
            .args(&argv[1..])
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
                let status = if output.status.success() {
                    ToolStatus::Ok
                } else {
                    ToolStatus::Error
                };
                ToolOutcome {
                    status,
                    result: stdout.trim_end().to_string(),
                    stdout,
                    stderr,
                    elapsed_ms: 0,
                }
            }
            Ok(Err(e)) => ToolOutcome::error(format!("failed to spawn `{}`: {e}", argv[0])),
            Err(_) => ToolOutcome::timeout(ctx.timeout.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ShellTool {
        ShellTool::new(vec!["echo".to_string(), "ls".to_string()], None)
    }

    #[tokio::test]
    async fn rejects_command_outside_allowlist() {
        let outcome = tool().execute("rm -rf /tmp/x", &ToolContext::default()).await;
        assert_eq!(outcome.status, ToolStatus::Blocked);
        assert!(outcome.stderr.contains("allowlist"));
    }

    #[tokio::test]
    async fn rejects_metacharacters_even_for_allowed_heads() {
        for command in [
            "echo hi; rm -rf /",
            "echo hi && ls",
            "echo hi | tee out",
            "echo `whoami`",
            "echo $(whoami)",
            "echo hi > /etc/passwd",
            "echo hi < secret",
        ] {
            let outcome = tool().execute(command, &ToolContext::default()).await;
            assert_eq!(outcome.status, ToolStatus::Blocked, "{command}");
        }
    }

    #[tokio::test]
    async fn rejects_empty_command() {
        let outcome = tool().execute("   ", &ToolContext::default()).await;
        assert_eq!(outcome.status, ToolStatus::Blocked);
    }
}
