//! Solver
//!
//! Drives the student model through one task: render the domain prompt,
//! query the endpoint (with retries), parse the reasoning trace, execute
//! the extracted tool plan, and pull out a final answer. Optionally
//! repeats the whole pass for consensus self-verification.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{ModelConfig, VerificationConfig};
use crate::tasks::{Task, ToolCall, ToolStatus, Trajectory};
use crate::tools::{PlanExecutor, ToolContext, ToolRegistry};

use super::{parser, prompts, GenerateOptions, InferenceEndpoint};

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("static pattern"));

/// Endpoint retries on top of the initial attempt, with 1s/2s/4s backoff.
const MAX_INFERENCE_RETRIES: u32 = 3;

struct SolveAttempt {
    answer: String,
    tool_calls: Vec<ToolCall>,
    reasoning: String,
}

pub struct Solver {
    endpoint: Arc<dyn InferenceEndpoint>,
    executor: PlanExecutor,
    opts: GenerateOptions,
    verification: VerificationConfig,
}

impl Solver {
    pub fn new(
        endpoint: Arc<dyn InferenceEndpoint>,
        registry: Arc<ToolRegistry>,
        ctx: ToolContext,
        model: &ModelConfig,
        verification: VerificationConfig,
        max_tokens: u32,
    ) -> Self {
        Self {
            endpoint,
            executor: PlanExecutor::new(registry, ctx),
            opts: GenerateOptions {
                temperature: model.temperature,
                top_p: model.top_p,
                max_tokens,
                seed: None,
            },
            verification,
        }
    }

    /// Solve a task. Never fails: a persistently unreachable endpoint
    /// yields an empty-answer trajectory with no tool calls.
    pub async fn solve(&self, task: &Task) -> Trajectory {
        if !self.verification.enable {
            let attempt = self.attempt(task, false).await;
            return match attempt {
                Ok(a) => Trajectory::new(task.clone(), a.answer, a.tool_calls, a.reasoning),
                Err(e) => {
                    warn!(task_id = %task.task_id, error = %e, "solver giving up after retries");
                    Trajectory::new(task.clone(), String::new(), Vec::new(), String::new())
                }
            };
        }

        // Self-verification: k independent passes, modal answer wins.
        let samples = self.verification.num_samples.max(1);
        let mut attempts = Vec::with_capacity(samples);
        for i in 0..samples {
            match self.attempt(task, self.verification.enable_cot).await {
                Ok(a) => attempts.push(a),
                Err(e) => warn!(task_id = %task.task_id, sample = i, error = %e, "verification sample failed"),
            }
        }
        if attempts.is_empty() {
            return Trajectory::new(task.clone(), String::new(), Vec::new(), String::new());
        }

        let answers: Vec<String> = attempts.iter().map(|a| a.answer.clone()).collect();
        let consensus = super::consensus(&answers);
        // Confidence is measured over the configured sample count even if
        // some passes failed outright.
        let confidence = consensus.confidence * attempts.len() as f64 / samples as f64;

        let modal_class = super::normalize_answer(&consensus.answer);
        let representative = attempts
            .iter()
            .position(|a| super::normalize_answer(&a.answer) == modal_class)
            .unwrap_or(0);
        let chosen = attempts.swap_remove(representative);

        let mut trajectory =
            Trajectory::new(task.clone(), chosen.answer, chosen.tool_calls, chosen.reasoning);
        trajectory.verification = Some(confidence);
        trajectory
    }

    async fn attempt(&self, task: &Task, chain_of_thought: bool) -> Result<SolveAttempt> {
        let prompt = prompts::reasoning_prompt(task, chain_of_thought);
        let raw = self.generate_with_retries(&prompt).await?;

        let parsed = parser::parse_trace(&raw);
        for issue in &parsed.errors {
            debug!(task_id = %task.task_id, %issue, "trace fragment skipped");
        }

        let tool_calls = match self.executor.execute(&parsed.tool_calls).await {
            Ok(calls) => calls,
            Err(e) => {
                // A cyclic plan forfeits tool execution but not the step.
                warn!(task_id = %task.task_id, error = %e, "tool plan rejected");
                Vec::new()
            }
        };

        let answer = extract_answer(&parsed.answer, &tool_calls);
        Ok(SolveAttempt {
            answer,
            tool_calls,
            reasoning: raw,
        })
    }

    async fn generate_with_retries(&self, prompt: &str) -> Result<String> {
        let mut delay = Duration::from_secs(1);
        for retry in 0..=MAX_INFERENCE_RETRIES {
            match self.endpoint.generate(prompt, &self.opts).await {
                Ok(text) => return Ok(text),
                Err(e) if retry < MAX_INFERENCE_RETRIES => {
                    warn!(retry, error = %e, "inference failed; backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    return Err(crate::error::CoevoError::InferenceUnavailable {
                        attempts: MAX_INFERENCE_RETRIES + 1,
                        reason: e.to_string(),
                    }
                    .into())
                }
            }
        }
        unreachable!("retry loop always returns")
    }
}

/// Answer preference: the parsed `Answer:` field, else the last ok tool
/// result passed through a numeric extraction, else empty.
fn extract_answer(parsed_answer: &str, tool_calls: &[ToolCall]) -> String {
    if !parsed_answer.is_empty() {
        return parsed_answer.to_string();
    }
    for call in tool_calls.iter().rev() {
        if call.status != ToolStatus::Ok {
            continue;
        }
        let source = if call.result.is_empty() {
            &call.stdout
        } else {
            &call.result
        };
        if let Some(found) = NUMERIC_RE.find(source) {
            return found.as_str().to_string();
        }
    }
    String::new()
}
