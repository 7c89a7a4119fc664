//! Core data records exchanged between the teacher and student sides.
//!
//! Task and Trajectory are immutable once emitted; ToolCall is built up
//! step by step during solving and frozen into the trajectory.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task domains the generator knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Math,
    Logic,
    Code,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Math, Domain::Logic, Domain::Code];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Math => "math",
            Domain::Logic => "logic",
            Domain::Code => "code",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "math" => Ok(Domain::Math),
            "logic" => Ok(Domain::Logic),
            "code" => Ok(Domain::Code),
            other => Err(format!("unknown domain `{other}`")),
        }
    }
}

/// How a candidate answer is judged. The tag travels with the task so a
/// trajectory consumer can re-verify offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifierSpec {
    /// Trimmed case-sensitive equality.
    ExactString { expected: String },
    /// Passes when `|candidate - expected| <= max(tolerance*|expected|, tolerance)`.
    Numeric { expected: f64, tolerance: f64 },
    /// Comma-separated candidate equals `expected` as multisets under tolerance.
    NumericSet { expected: Vec<f64>, tolerance: f64 },
    /// Boolean expression over `{{candidate}}`; the last line is the predicate.
    PythonPredicate { body: String },
    /// Statement block that must complete without raising.
    PythonAssert { body: String },
    /// Anchored regex over the trimmed candidate.
    RegexMatch { pattern: String },
}

/// An immutable task record emitted by the teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub domain: Domain,
    /// Difficulty signal in [0, 1] the generator tiered on.
    pub difficulty: f64,
    pub prompt: String,
    /// Informational predicates shown to the student.
    pub constraints: Vec<String>,
    pub verifier: VerifierSpec,
    /// Always includes `created_at` (unix millis).
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Outcome classification for one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
    Blocked,
    Timeout,
}

/// One tool invocation, frozen after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub step_id: String,
    pub tool: String,
    /// Input after `{{step_k.*}}` substitution (as executed).
    pub input: String,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    pub status: ToolStatus,
    pub result: String,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

/// Per-component reward breakdown. `total` is always the weighted sum of
/// the components under the weights in effect at step time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub uncertainty: f64,
    pub tool_use: f64,
    pub novelty: f64,
    pub correctness: f64,
    pub total: f64,
}

/// The emitted record of one co-evolution step; sufficient for offline
/// fine-tuning of the student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub task: Task,
    /// Final extracted answer.
    pub result: String,
    pub tool_calls: Vec<ToolCall>,
    /// Raw model text the answer was parsed from.
    pub reasoning: String,
    pub success: bool,
    /// Calibrated success-probability estimate in [0, 1].
    pub confidence: f64,
    pub reward: RewardBreakdown,
    /// Consensus confidence from self-verification, when enabled.
    pub verification: Option<f64>,
    /// Informational routing tag ("local" / "cloud").
    pub route: String,
    pub timestamp: DateTime<Utc>,
}

impl Trajectory {
    /// A fresh, unverified trajectory with zeroed reward.
    pub fn new(task: Task, result: String, tool_calls: Vec<ToolCall>, reasoning: String) -> Self {
        Self {
            task,
            result,
            tool_calls,
            reasoning,
            success: false,
            confidence: 0.0,
            reward: RewardBreakdown::default(),
            verification: None,
            route: "local".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn ok_call_count(&self) -> usize {
        self.tool_calls
            .iter()
            .filter(|c| c.status == ToolStatus::Ok)
            .count()
    }
}
