//! Test Tool
//!
//! Disabled by default. Runs a predicate body (with the candidate already
//! substituted by the caller) through the gated Python runner and maps the
//! printed PASS/FAIL marker onto the outcome.

use std::sync::Arc;

use async_trait::async_trait;

use crate::safety::{self, SecurityEvent, SecurityEventKind, SecurityEventLog, Severity};
use crate::tasks::ToolStatus;

use super::python::run_python;
use super::{Tool, ToolContext, ToolOutcome};

pub struct TestTool {
    events: Option<Arc<SecurityEventLog>>,
}

impl TestTool {
    pub fn new(events: Option<Arc<SecurityEventLog>>) -> Self {
        Self { events }
    }
}

/// Wrap a predicate body so its last line is evaluated as a boolean and
/// a PASS/FAIL marker is printed. Earlier lines (e.g. a substituted
/// candidate definition) run as-is.
pub fn wrap_predicate(body: &str) -> String {
    let trimmed = body.trim_end();
    let (setup, last) = match trimmed.rfind('\n') {
        Some(idx) => (&trimmed[..idx], trimmed[idx + 1..].trim()),
        None => ("", trimmed.trim()),
    };
    let mut program = String::new();
    if !setup.is_empty() {
        program.push_str(setup);
        program.push('\n');
    }
    program.push_str(&format!(
        "__predicate = bool({last})\nprint(\"PASS\" if __predicate else \"FAIL\")\n"
    ));
    program
}

#[async_trait]
impl Tool for TestTool {
    fn name(&self) -> &'static str {
        "test"
    }

    fn description(&self) -> &'static str {
        "Evaluate a boolean predicate body; the final line is the predicate"
    }

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolOutcome {
        let report = safety::review(input);
        if !report.safe {
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

        let mut outcome = run_python(&wrap_predicate(input), ctx).await;
        if outcome.status == ToolStatus::Ok && outcome.result != "PASS" {
            // The predicate ran but evaluated falsy.
            outcome.status = ToolStatus::Error;
            outcome.stderr = "predicate evaluated to False".to_string();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_single_expression() {
        let program = wrap_predicate("1 + 1 == 2");
        assert!(program.contains("bool(1 + 1 == 2)"));
        assert!(program.contains("PASS"));
    }

    #[test]
    fn keeps_setup_lines_above_the_predicate() {
        let body = "def add(a, b):\n    return a + b\nadd(2, 3) == 5";
        let program = wrap_predicate(body);
        assert!(program.starts_with("def add(a, b):"));
        assert!(program.contains("bool(add(2, 3) == 5)"));
    }

    #[tokio::test]
    async fn gate_applies_before_execution() {
        let tool = TestTool::new(None);
        let outcome = tool
            .execute("__import__('os').getcwd() == ''", &ToolContext::default())
            .await;
        assert_eq!(outcome.status, ToolStatus::Blocked);
    }
}
