//! Tool System Module
//!
//! Named tools behind a registry, plus the plan composer that executes
//! DAG-ordered sequences of tool calls with inter-step substitution.

mod composer;
mod math;
mod python;
mod shell;
mod test_runner;

pub use composer::{plan_ok, PlanExecutor, PlanStep};
pub use math::MathTool;
pub use python::PythonTool;
pub use shell::ShellTool;
pub use test_runner::{wrap_predicate, TestTool};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{ResourceLimitsConfig, ToolingConfig};
use crate::safety::SecurityEventLog;
use crate::tasks::ToolStatus;

/// Execution-time parameters shared by all tools.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub timeout: Duration,
    pub workdir: PathBuf,
    pub max_output_kb: usize,
}

impl ToolContext {
    pub fn new(tooling: &ToolingConfig, limits: &ResourceLimitsConfig) -> Self {
        Self {
            timeout: Duration::from_secs(tooling.timeout_seconds),
            workdir: tooling.workdir.clone(),
            max_output_kb: limits.max_output_kb,
        }
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(&ToolingConfig::default(), &ResourceLimitsConfig::default())
    }
}

/// Outcome of one tool execution. Failures are encoded in `status`, not
/// surfaced as errors, so a plan can keep running past a bad step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub result: String,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

impl ToolOutcome {
    pub fn ok(result: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Ok,
            result: result.into(),
            stdout: stdout.into(),
            stderr: String::new(),
            elapsed_ms: 0,
        }
    }

    pub fn error(stderr: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            result: String::new(),
            stdout: String::new(),
            stderr: stderr.into(),
            elapsed_ms: 0,
        }
    }

    pub fn blocked(rationale: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Blocked,
            result: String::new(),
            stdout: String::new(),
            stderr: rationale.into(),
            elapsed_ms: 0,
        }
    }

    pub fn timeout(timeout_secs: u64) -> Self {
        Self {
            status: ToolStatus::Timeout,
            result: String::new(),
            stdout: String::new(),
            stderr: format!("timed out after {timeout_secs}s"),
            elapsed_ms: timeout_secs.saturating_mul(1000),
        }
    }
}

/// Trait for tools the solver can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn execute(&self, input: &str, ctx: &ToolContext) -> ToolOutcome;
}

/// Registry of enabled tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Build the registry the tooling config asks for. Shell and test
    /// tools stay out unless explicitly enabled.
    pub async fn from_config(
        tooling: &ToolingConfig,
        events: Option<Arc<SecurityEventLog>>,
    ) -> Self {
        let registry = Self::new();
        if tooling.enable_math {
            registry.register_instance(MathTool::new()).await;
        }
        if tooling.enable_python {
            registry
                .register_instance(PythonTool::new(events.clone()))
                .await;
        }
        if tooling.enable_shell {
            registry
                .register_instance(ShellTool::new(tooling.allowed_shell.clone(), events.clone()))
                .await;
        }
        if tooling.enable_tests {
            registry.register_instance(TestTool::new(events)).await;
        }
        registry
    }

    pub async fn register_instance<T: Tool + 'static>(&self, tool: T) {
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub async fn tool_names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<_> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Execute one tool by name, stamping wall-clock elapsed time. An
    /// unknown name is an error outcome, not a fault.
    pub async fn execute(&self, name: &str, input: &str, ctx: &ToolContext) -> ToolOutcome {
        let tool = self.get_tool(name).await;
        let started = Instant::now();
        let mut outcome = match tool {
            Some(tool) => tool.execute(input, ctx).await,
            None => ToolOutcome::error(format!("unknown tool: {name}")),
        };
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
