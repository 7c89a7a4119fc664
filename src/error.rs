//! Fault taxonomy for the co-evolution core.
//!
//! Every kind carries enough context to be logged at the coordinator
//! boundary without re-deriving it from the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoevoError {
    /// Fatal at startup; the coordinator refuses to run.
    #[error("invalid configuration at `{path}`: {reason}")]
    ConfigInvalid { path: String, reason: String },

    /// The inference endpoint stayed unreachable through all retries.
    #[error("inference endpoint unavailable after {attempts} attempts: {reason}")]
    InferenceUnavailable { attempts: u32, reason: String },

    /// Task generation failed validation twice for the same signal.
    #[error("task generator exhausted for domain `{domain}`: {reason}")]
    GeneratorExhausted { domain: String, reason: String },

    /// A malformed fragment in a reasoning trace. Non-fatal; the parser
    /// returns the calls it could recover.
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// The tool plan's dependency graph contains a cycle.
    #[error("tool plan contains a dependency cycle (first stuck step: `{step_id}`)")]
    PlanCyclic { step_id: String },

    /// The code review gate rejected a tool input.
    #[error("tool `{tool}` blocked: {reason}")]
    ToolBlocked { tool: String, reason: String },

    #[error("tool `{tool}` timed out after {timeout_secs}s")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("tool `{tool}` failed: {reason}")]
    ToolError { tool: String, reason: String },

    /// Treated as a failed verification for success purposes.
    #[error("verifier error: {reason}")]
    VerifierError { reason: String },

    /// A task budget window is exhausted; the step is skipped.
    #[error("rate limited: {window} window exhausted")]
    RateLimited { window: String },

    /// The advisory file lock could not be acquired within its timeout.
    #[error("lock contention on `{path}`")]
    LockContention { path: String },
}

impl CoevoError {
    /// Stable component tag used in coordinator fault logs.
    pub fn component(&self) -> &'static str {
        match self {
            CoevoError::ConfigInvalid { .. } => "config",
            CoevoError::InferenceUnavailable { .. } => "inference",
            CoevoError::GeneratorExhausted { .. } => "generator",
            CoevoError::Parse { .. } => "parser",
            CoevoError::PlanCyclic { .. }
            | CoevoError::ToolBlocked { .. }
            | CoevoError::ToolTimeout { .. }
            | CoevoError::ToolError { .. } => "tools",
            CoevoError::VerifierError { .. } => "verifier",
            CoevoError::RateLimited { .. } => "rate_limiter",
            CoevoError::LockContention { .. } => "storage",
        }
    }
}
