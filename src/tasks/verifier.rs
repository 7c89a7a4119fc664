//! Verifier
//!
//! Judges a candidate answer against the task's `VerifierSpec`. Python
//! bodies go through the review-gated python tool; everything else is
//! checked in-process. The verifier never mutates its inputs.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::safety::SecurityEventLog;
use crate::tasks::{Task, ToolStatus, VerifierSpec};
use crate::tools::{wrap_predicate, PythonTool, Tool, ToolContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Pass,
    Fail,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub reason: String,
}

impl Verdict {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Pass,
            reason: reason.into(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Fail,
            reason: reason.into(),
        }
    }

    fn error(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Error,
            reason: reason.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == VerdictStatus::Pass
    }
}

/// Relative-tolerance acceptance: `|c - e| <= max(tol*|e|, tol)`.
pub fn within_tolerance(candidate: f64, expected: f64, tolerance: f64) -> bool {
    (candidate - expected).abs() <= (tolerance * expected.abs()).max(tolerance)
}

pub struct Verifier {
    python: PythonTool,
    ctx: ToolContext,
}

impl Verifier {
    pub fn new(ctx: ToolContext, events: Option<Arc<SecurityEventLog>>) -> Self {
        Self {
            python: PythonTool::new(events),
            ctx,
        }
    }

    pub async fn verify(&self, task: &Task, candidate: &str) -> Verdict {
        let candidate = candidate.trim();
        match &task.verifier {
            VerifierSpec::ExactString { expected } => {
                if candidate == expected.trim() {
                    Verdict::pass("exact match")
                } else {
                    Verdict::fail(format!("expected `{}`, got `{candidate}`", expected.trim()))
                }
            }
            VerifierSpec::Numeric {
                expected,
                tolerance,
            } => match candidate.parse::<f64>() {
                Ok(value) if within_tolerance(value, *expected, *tolerance) => {
                    Verdict::pass("within tolerance")
                }
                Ok(value) => Verdict::fail(format!("expected {expected}, got {value}")),
                Err(_) => Verdict::fail(format!("`{candidate}` is not numeric")),
            },
            VerifierSpec::NumericSet {
                expected,
                tolerance,
            } => verify_numeric_set(candidate, expected, *tolerance),
            VerifierSpec::PythonPredicate { body } => {
                let program = wrap_predicate(&body.replace("{{candidate}}", candidate));
                let outcome = self.python.execute(&program, &self.ctx).await;
                match outcome.status {
                    ToolStatus::Blocked => Verdict::error("verifier_blocked"),
                    ToolStatus::Ok if outcome.result == "PASS" => Verdict::pass("predicate held"),
                    ToolStatus::Ok => Verdict::fail("predicate evaluated to False"),
                    ToolStatus::Timeout => Verdict::error("verifier timed out"),
                    ToolStatus::Error => Verdict::fail(format!(
                        "predicate raised: {}",
                        outcome.stderr.lines().last().unwrap_or("")
                    )),
                }
            }
            VerifierSpec::PythonAssert { body } => {
                let program = body.replace("{{candidate}}", candidate);
                let outcome = self.python.execute(&program, &self.ctx).await;
                match outcome.status {
                    ToolStatus::Blocked => Verdict::error("verifier_blocked"),
                    ToolStatus::Ok if outcome.stderr.trim().is_empty() => {
                        Verdict::pass("assertions held")
                    }
                    ToolStatus::Ok => Verdict::fail("assertion block wrote to stderr"),
                    ToolStatus::Timeout => Verdict::error("verifier timed out"),
                    ToolStatus::Error => Verdict::fail(format!(
                        "assertion raised: {}",
                        outcome.stderr.lines().last().unwrap_or("")
                    )),
                }
            }
            VerifierSpec::RegexMatch { pattern } => {
                let anchored = format!("^(?:{pattern})$");
                match Regex::new(&anchored) {
                    Ok(re) => {
                        if re.is_match(candidate) {
                            Verdict::pass("pattern matched")
                        } else {
                            Verdict::fail(format!("`{candidate}` does not match `{pattern}`"))
                        }
                    }
                    Err(e) => Verdict::error(format!("bad verifier pattern: {e}")),
                }
            }
        }
    }
}

fn verify_numeric_set(candidate: &str, expected: &[f64], tolerance: f64) -> Verdict {
    let mut values = Vec::new();
    for part in candidate.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.parse::<f64>() {
            Ok(value) => values.push(value),
            Err(_) => return Verdict::fail(format!("`{part}` is not numeric")),
        }
    }
    if values.len() != expected.len() {
        return Verdict::fail(format!(
            "expected {} values, got {}",
            expected.len(),
            values.len()
        ));
    }

    // Multiset match under tolerance: greedily pair each expected value
    // with an unused candidate.
    let mut used = vec![false; values.len()];
    for &e in expected {
        let found = values
            .iter()
            .enumerate()
            .position(|(i, &v)| !used[i] && within_tolerance(v, e, tolerance));
        match found {
            Some(i) => used[i] = true,
            None => return Verdict::fail(format!("no candidate value matches {e}")),
        }
    }
    Verdict::pass("multiset match")
}
