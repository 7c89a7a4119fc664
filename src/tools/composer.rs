//! Plan Composer
//!
//! Executes an ordered sequence of tool-call templates whose inputs may
//! reference earlier results (`{{step_k.result}}` / `{{step_k.stdout}}`).
//! Steps run in an order that respects `depends_on` without reordering
//! independent steps relative to their declared order.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::error::CoevoError;
use crate::tasks::{ToolCall, ToolStatus};

use super::{ToolContext, ToolRegistry};

static STEP_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\.(result|stdout)\s*\}\}").expect("static pattern")
});

/// A tool-call template awaiting execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub step_id: String,
    pub tool: String,
    pub input: String,
    pub depends_on: BTreeSet<String>,
    /// Optional steps may fail without failing the plan.
    pub optional: bool,
}

impl PlanStep {
    pub fn new(step_id: impl Into<String>, tool: impl Into<String>, input: impl Into<String>) -> Self {
        let input = input.into();
        let depends_on = referenced_steps(&input);
        Self {
            step_id: step_id.into(),
            tool: tool.into(),
            input,
            depends_on,
            optional: false,
        }
    }

    pub fn depends_on(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.insert(dep.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Step ids referenced by substitution markers in an input string.
pub fn referenced_steps(input: &str) -> BTreeSet<String> {
    STEP_REF_RE
        .captures_iter(input)
        .map(|c| c[1].to_string())
        .collect()
}

/// Plan status: ok iff every required step finished ok.
pub fn plan_ok(steps: &[PlanStep], calls: &[ToolCall]) -> bool {
    let by_id: HashMap<&str, &ToolCall> = calls.iter().map(|c| (c.step_id.as_str(), c)).collect();
    steps.iter().all(|step| {
        step.optional
            || by_id
                .get(step.step_id.as_str())
                .map(|c| c.status == ToolStatus::Ok)
                .unwrap_or(false)
    })
}

pub struct PlanExecutor {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    max_retries: u32,
}

impl PlanExecutor {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self {
            registry,
            ctx,
            max_retries: 1,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Execute all steps. Rejects cyclic plans up front; a step whose
    /// dependency is missing or failed is recorded as blocked and its tool
    /// never runs. Transient errors are retried up to `max_retries`.
    pub async fn execute(&self, steps: &[PlanStep]) -> Result<Vec<ToolCall>, CoevoError> {
        let order = stable_topological_order(steps)?;
        let mut outcomes: HashMap<String, (ToolStatus, String, String)> = HashMap::new();
        let mut calls = Vec::with_capacity(steps.len());

        for index in order {
            let step = &steps[index];
            let mut deps = step.depends_on.clone();
            deps.extend(referenced_steps(&step.input));

            let unmet = deps.iter().find(|dep| {
                outcomes
                    .get(dep.as_str())
                    .map(|(status, _, _)| *status != ToolStatus::Ok)
                    .unwrap_or(true)
            });
            if let Some(dep) = unmet {
                let reason = if outcomes.contains_key(dep.as_str()) {
                    format!("dependency `{dep}` did not succeed")
                } else {
                    format!("dependency `{dep}` is missing")
                };
                debug!(step = %step.step_id, reason = %reason, "step blocked");
                outcomes.insert(
                    step.step_id.clone(),
                    (ToolStatus::Blocked, String::new(), String::new()),
                );
                calls.push(ToolCall {
                    step_id: step.step_id.clone(),
                    tool: step.tool.clone(),
                    input: step.input.clone(),
                    depends_on: step.depends_on.clone(),
                    status: ToolStatus::Blocked,
                    result: String::new(),
                    stdout: String::new(),
                    stderr: reason,
                    elapsed_ms: 0,
                });
                continue;
            }

            let input = substitute(&step.input, &outcomes);

            let mut attempt = 0;
            let outcome = loop {
                let outcome = self.registry.execute(&step.tool, &input, &self.ctx).await;
                if outcome.status == ToolStatus::Error && attempt < self.max_retries {
                    attempt += 1;
                    debug!(step = %step.step_id, attempt, "retrying transient tool error");
                    continue;
                }
                break outcome;
            };

            outcomes.insert(
                step.step_id.clone(),
                (
                    outcome.status,
                    outcome.result.clone(),
                    outcome.stdout.clone(),
                ),
            );
            calls.push(ToolCall {
                step_id: step.step_id.clone(),
                tool: step.tool.clone(),
                input,
                depends_on: step.depends_on.clone(),
                status: outcome.status,
                result: outcome.result,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
                elapsed_ms: outcome.elapsed_ms,
            });
        }

        Ok(calls)
    }
}

/// Substitute `{{id.result}}` / `{{id.stdout}}` with recorded values.
/// Purely textual; callers have already established that every referenced
/// step succeeded.
fn substitute(input: &str, outcomes: &HashMap<String, (ToolStatus, String, String)>) -> String {
    STEP_REF_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            match outcomes.get(&caps[1]) {
                Some((_, result, stdout)) => {
                    if &caps[2] == "result" {
                        result.clone()
                    } else {
                        stdout.clone()
                    }
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Declared-order-stable topological sort: repeatedly take the first step
/// in declared order whose in-plan dependencies are all scheduled.
fn stable_topological_order(steps: &[PlanStep]) -> Result<Vec<usize>, CoevoError> {
    let ids: BTreeSet<&str> = steps.iter().map(|s| s.step_id.as_str()).collect();
    let mut scheduled: Vec<usize> = Vec::with_capacity(steps.len());
    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut remaining: Vec<usize> = (0..steps.len()).collect();

    while !remaining.is_empty() {
        let next = remaining.iter().position(|&i| {
            let step = &steps[i];
            let mut deps = step.depends_on.clone();
            deps.extend(referenced_steps(&step.input));
            deps.iter()
                // Dependencies outside the plan are an execution-time
                // concern (the step blocks); they must not wedge ordering.
                .filter(|d| ids.contains(d.as_str()))
                .all(|d| done.contains(d.as_str()))
        });
        match next {
            Some(pos) => {
                let index = remaining.remove(pos);
                done.insert(steps[index].step_id.as_str());
                scheduled.push(index);
            }
            None => {
                return Err(CoevoError::PlanCyclic {
                    step_id: steps[remaining[0]].step_id.clone(),
                });
            }
        }
    }
    Ok(scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &'static str {
            "upper"
        }
        fn description(&self) -> &'static str {
            "uppercases its input"
        }
        async fn execute(&self, input: &str, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::ok(input.to_uppercase(), input.to_uppercase())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn description(&self) -> &'static str {
            "always errors"
        }
        async fn execute(&self, _input: &str, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::error("boom")
        }
    }

    struct FlakyTool {
        failures: AtomicU32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn description(&self) -> &'static str {
            "fails once then succeeds"
        }
        async fn execute(&self, input: &str, _ctx: &ToolContext) -> ToolOutcome {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            }).is_ok()
            {
                ToolOutcome::error("transient")
            } else {
                ToolOutcome::ok(input, input)
            }
        }
    }

    async fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register_instance(UpperTool).await;
        registry.register_instance(FailingTool).await;
        registry
            .register_instance(FlakyTool {
                failures: AtomicU32::new(1),
            })
            .await;
        Arc::new(registry)
    }

    fn executor(registry: Arc<ToolRegistry>) -> PlanExecutor {
        PlanExecutor::new(registry, ToolContext::default())
    }

    #[tokio::test]
    async fn substitutes_results_between_steps() {
        let executor = executor(registry().await);
        let plan = vec![
            PlanStep::new("step_1", "upper", "ab"),
            PlanStep::new("step_2", "upper", "got {{step_1.result}}"),
        ];
        let calls = executor.execute(&plan).await.unwrap();
        assert_eq!(calls[1].input, "got AB");
        assert_eq!(calls[1].result, "GOT AB");
        assert!(calls[1].depends_on.contains("step_1"));
        assert!(plan_ok(&plan, &calls));
    }

    #[tokio::test]
    async fn blocked_step_does_not_execute_and_cascades() {
        let executor = executor(registry().await);
        let plan = vec![
            PlanStep::new("step_1", "broken", "x"),
            PlanStep::new("step_2", "upper", "{{step_1.result}}"),
            PlanStep::new("step_3", "upper", "{{step_2.result}}"),
        ];
        let calls = executor.execute(&plan).await.unwrap();
        assert_eq!(calls[0].status, ToolStatus::Error);
        assert_eq!(calls[1].status, ToolStatus::Blocked);
        assert!(calls[1].stderr.contains("did not succeed"));
        assert_eq!(calls[2].status, ToolStatus::Blocked);
        assert!(!plan_ok(&plan, &calls));
    }

    #[tokio::test]
    async fn missing_dependency_blocks() {
        let executor = executor(registry().await);
        let plan = vec![PlanStep::new("step_1", "upper", "{{step_9.result}}")];
        let calls = executor.execute(&plan).await.unwrap();
        assert_eq!(calls[0].status, ToolStatus::Blocked);
        assert!(calls[0].stderr.contains("missing"));
    }

    #[tokio::test]
    async fn cyclic_plan_is_rejected() {
        let executor = executor(registry().await);
        let plan = vec![
            PlanStep::new("step_1", "upper", "a").depends_on("step_2"),
            PlanStep::new("step_2", "upper", "b").depends_on("step_1"),
        ];
        let err = executor.execute(&plan).await.unwrap_err();
        assert!(matches!(err, CoevoError::PlanCyclic { .. }));
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let executor = executor(registry().await);
        let plan = vec![PlanStep::new("step_1", "flaky", "x")];
        let calls = executor.execute(&plan).await.unwrap();
        assert_eq!(calls[0].status, ToolStatus::Ok);
    }

    #[tokio::test]
    async fn declared_order_is_kept_for_independent_steps() {
        let executor = executor(registry().await);
        let plan = vec![
            PlanStep::new("step_b", "upper", "one"),
            PlanStep::new("step_a", "upper", "two"),
            PlanStep::new("step_c", "upper", "three"),
        ];
        let calls = executor.execute(&plan).await.unwrap();
        let order: Vec<_> = calls.iter().map(|c| c.step_id.as_str()).collect();
        assert_eq!(order, vec!["step_b", "step_a", "step_c"]);
    }

    #[tokio::test]
    async fn dependency_later_in_declared_order_still_runs_first() {
        let executor = executor(registry().await);
        let plan = vec![
            PlanStep::new("step_1", "upper", "{{step_2.result}}"),
            PlanStep::new("step_2", "upper", "base"),
        ];
        let calls = executor.execute(&plan).await.unwrap();
        let order: Vec<_> = calls.iter().map(|c| c.step_id.as_str()).collect();
        assert_eq!(order, vec!["step_2", "step_1"]);
        assert_eq!(calls[1].input, "BASE");
    }

    #[tokio::test]
    async fn optional_step_failure_does_not_fail_plan() {
        let executor = executor(registry().await);
        let plan = vec![
            PlanStep::new("step_1", "upper", "keep"),
            PlanStep::new("step_2", "broken", "x").optional(),
        ];
        let calls = executor.execute(&plan).await.unwrap();
        assert!(plan_ok(&plan, &calls));
    }
}
