//! End-to-end scenarios for the co-evolution loop, driven through the
//! coordinator with a scripted inference endpoint.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use coevo::agent::{GenerateOptions, InferenceEndpoint};
use coevo::config::Config;
use coevo::orchestrator::{Coordinator, StepOverrides};
use coevo::tasks::{Domain, PromptOverride, ToolStatus, VerifierSpec};

/// Scripted endpoint: critique prompts get a fixed probability, solver
/// prompts are answered by the supplied function (with access to a call
/// counter for sequenced replies).
struct ScriptedEndpoint {
    solve: Box<dyn Fn(&str, usize) -> String + Send + Sync>,
    solver_calls: Mutex<usize>,
}

impl ScriptedEndpoint {
    fn new(solve: impl Fn(&str, usize) -> String + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            solve: Box::new(solve),
            solver_calls: Mutex::new(0),
        })
    }
}

#[async_trait]
impl InferenceEndpoint for ScriptedEndpoint {
    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Result<String> {
        if prompt.starts_with("You are an evaluator") {
            return Ok("0.5".to_string());
        }
        let mut calls = self.solver_calls.lock().unwrap();
        let index = *calls;
        *calls += 1;
        Ok((self.solve)(prompt, index))
    }
}

fn config(run_dir: &std::path::Path) -> Config {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut config = Config::default();
    config.run_dir = coevo::config::RunDir(run_dir.to_path_buf());
    config.tooling.workdir = run_dir.join("sandbox");
    config
}

fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Solve the generated linear equation out of the rendered prompt text.
fn solve_linear_prompt(prompt: &str) -> Option<(String, i64)> {
    let line = prompt.lines().find(|l| l.contains("Solve for x:"))?;
    let start = line.find("Solve for x:")?;
    let equation = line[start + "Solve for x:".len()..]
        .trim()
        .trim_end_matches('.');
    let (lhs, rhs) = equation.split_once('=')?;
    let c: i64 = rhs.trim().parse().ok()?;
    let lhs = lhs.trim();
    let (ax, b) = match (lhs.split_once('+'), lhs.split_once('-')) {
        (Some((ax, b)), _) => (ax.trim(), b.trim().parse::<i64>().ok()?),
        (None, Some((ax, b))) => (ax.trim(), -b.trim().parse::<i64>().ok()?),
        (None, None) => (lhs, 0),
    };
    let a: i64 = ax.trim().trim_end_matches('x').parse().ok()?;
    if a == 0 || (c - b) % a != 0 {
        return None;
    }
    Some((equation.to_string(), (c - b) / a))
}

// Easy linear math task, correct tool-assisted solve.
#[tokio::test]
async fn easy_linear_math_correct_solve() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = ScriptedEndpoint::new(|prompt, _| match solve_linear_prompt(prompt) {
        Some((equation, x)) => {
            format!("Thought: isolate x\nTool: math\nToolInput: {equation}\nAnswer: {x}")
        }
        None => "Answer: 0".to_string(),
    });
    let mut coordinator = Coordinator::with_endpoint(config(dir.path()), endpoint)
        .await
        .unwrap();

    let trajectory = coordinator
        .run_once(StepOverrides {
            next_task_id: Some("t1".to_string()),
            domain: Some(Domain::Math),
            difficulty: Some(0.2),
            prompt_override: None,
        })
        .await
        .expect("step should emit a trajectory");

    assert!(trajectory.success);
    assert_eq!(trajectory.task.task_id, "t1");
    assert_eq!(trajectory.reward.correctness, 1.0);
    assert!(trajectory.reward.tool_use >= 0.25);
    assert_eq!(trajectory.tool_calls.len(), 1);
    assert_eq!(trajectory.tool_calls[0].tool, "math");
    assert_eq!(trajectory.tool_calls[0].status, ToolStatus::Ok);
}

// Code task solved through a two-step python plan with inter-step
// substitution.
#[tokio::test]
async fn code_task_with_tool_composition() {
    if !python3_available() {
        eprintln!("python3 unavailable; skipping composition scenario");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    const CANDIDATE: &str = "binary_search = lambda xs, t: xs.index(t) if t in xs else -1";
    const CHECKS: &str = "binary_search([1, 3, 5, 7, 9], 7) == 3 \
                          and binary_search([1, 3, 5], 4) == -1 and binary_search([], 1) == -1";

    let endpoint = ScriptedEndpoint::new(move |_prompt, _| {
        format!(
            "Thought: write the function, then run it against the fixed vectors\n\
             Tool: python\n\
             ToolInput: print(\"{CANDIDATE}\")\n\
             Tool: python\n\
             ToolInput: {{{{step_1.result}}}}; print(\"PASS\" if {CHECKS} else \"FAIL\")\n\
             Answer: {CANDIDATE}"
        )
    });
    let mut coordinator = Coordinator::with_endpoint(config(dir.path()), endpoint)
        .await
        .unwrap();

    let trajectory = coordinator
        .run_once(StepOverrides {
            next_task_id: Some("t2".to_string()),
            domain: Some(Domain::Code),
            difficulty: Some(0.8),
            prompt_override: Some(PromptOverride {
                prompt: "Write a Python function binary_search(xs, target) that returns the \
                         index of target in the sorted list xs, or -1 when absent. Reply with \
                         the code only."
                    .to_string(),
                verifier: VerifierSpec::PythonPredicate {
                    body: format!("{{{{candidate}}}}\n{CHECKS}"),
                },
            }),
        })
        .await
        .expect("step should emit a trajectory");

    assert!(trajectory.success);
    assert_eq!(trajectory.tool_calls.len(), 2);
    let step_b = &trajectory.tool_calls[1];
    assert_eq!(step_b.status, ToolStatus::Ok);
    // The recorded input is post-substitution: step A's printed source.
    assert!(step_b.input.starts_with(CANDIDATE));
    assert!(step_b.depends_on.contains("step_1"));
    assert_eq!(step_b.result, "PASS");
}

// Blocked code falls back to the math tool; the step still succeeds and
// the blocked call is on the record.
#[tokio::test]
async fn blocked_code_falls_back_to_math() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = ScriptedEndpoint::new(|_prompt, _| {
        "Thought: try python first\n\
         Tool: python\n\
         ToolInput: import os; os.system(\"rm -rf /\")\n\
         Tool: math\n\
         ToolInput: 2x + 3 = 11\n\
         Answer: 4"
            .to_string()
    });
    let mut coordinator = Coordinator::with_endpoint(config(dir.path()), endpoint)
        .await
        .unwrap();

    let trajectory = coordinator
        .run_once(StepOverrides {
            next_task_id: Some("t3".to_string()),
            domain: Some(Domain::Math),
            difficulty: None,
            prompt_override: Some(PromptOverride {
                prompt: "Solve for x: 2x + 3 = 11.".to_string(),
                verifier: VerifierSpec::Numeric {
                    expected: 4.0,
                    tolerance: 1e-6,
                },
            }),
        })
        .await
        .expect("step should emit a trajectory");

    assert!(trajectory.success);
    let blocked = &trajectory.tool_calls[0];
    assert_eq!(blocked.status, ToolStatus::Blocked);
    assert!(blocked.stderr.contains("import: os"));
    assert!(blocked.stderr.contains("recursive delete"));
    assert_eq!(trajectory.tool_calls[1].status, ToolStatus::Ok);
    assert_eq!(trajectory.result, "4");

    let events = std::fs::read_to_string(dir.path().join("security_events.jsonl")).unwrap();
    assert!(events.contains("code_execution_blocked"));
}

// Self-verification disagreement downgrades success even though the
// modal answer verifies.
#[tokio::test]
async fn self_verification_disagreement_downgrades_success() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = ScriptedEndpoint::new(|_prompt, index| {
        let answer = if index == 2 { "43" } else { "42" };
        format!("Answer: {answer}")
    });
    let mut config = config(dir.path());
    config.verification.enable = true;
    config.verification.num_samples = 3;
    config.verification.confidence_threshold = 0.7;
    config.verification.enable_cot = false;
    let mut coordinator = Coordinator::with_endpoint(config, endpoint).await.unwrap();

    let trajectory = coordinator
        .run_once(StepOverrides {
            next_task_id: Some("t4".to_string()),
            domain: Some(Domain::Math),
            difficulty: None,
            prompt_override: Some(PromptOverride {
                prompt: "What is 6 times 7?".to_string(),
                verifier: VerifierSpec::Numeric {
                    expected: 42.0,
                    tolerance: 1e-6,
                },
            }),
        })
        .await
        .expect("step should emit a trajectory");

    assert_eq!(trajectory.result, "42");
    let verification = trajectory.verification.expect("verification recorded");
    assert!((verification - 2.0 / 3.0).abs() < 1e-9);
    assert!(!trajectory.success, "contested consensus must not count as success");
}

// The second step inside a one-per-minute budget is skipped and leaves
// no trajectory behind.
#[tokio::test]
async fn rate_limit_skips_the_second_step() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = ScriptedEndpoint::new(|prompt, _| match solve_linear_prompt(prompt) {
        Some((equation, x)) => format!("Tool: math\nToolInput: {equation}\nAnswer: {x}"),
        None => "Answer: 0".to_string(),
    });
    let mut config = config(dir.path());
    config.rate_limits.max_tasks_per_minute = 1;
    let mut coordinator = Coordinator::with_endpoint(config, endpoint).await.unwrap();

    let first = coordinator
        .run_once(StepOverrides {
            domain: Some(Domain::Math),
            difficulty: Some(0.2),
            ..StepOverrides::default()
        })
        .await;
    assert!(first.is_some());

    let second = coordinator.run_once(StepOverrides::default()).await;
    assert!(second.is_none());

    let log = std::fs::read_to_string(dir.path().join("trajectories.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
    let events = std::fs::read_to_string(dir.path().join("security_events.jsonl")).unwrap();
    assert!(events.contains("rate_limit_exceeded"));
}

// Emitted lines are self-contained JSON records with the documented
// top-level shape and unique task ids.
#[tokio::test]
async fn trajectory_log_lines_are_valid_and_unique() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = ScriptedEndpoint::new(|prompt, _| match solve_linear_prompt(prompt) {
        Some((equation, x)) => format!("Tool: math\nToolInput: {equation}\nAnswer: {x}"),
        None => "Answer: maybe".to_string(),
    });
    let mut config = config(dir.path());
    // Keep every generated task in the deterministic linear tier.
    config.curriculum.enable_frontier = false;
    config.curriculum.domains = vec![Domain::Math];
    let mut coordinator = Coordinator::with_endpoint(config, endpoint).await.unwrap();

    for _ in 0..5 {
        coordinator
            .run_once(StepOverrides {
                difficulty: Some(0.2),
                ..StepOverrides::default()
            })
            .await
            .expect("step should emit a trajectory");
    }

    let log = std::fs::read_to_string(dir.path().join("trajectories.jsonl")).unwrap();
    let mut seen_ids = std::collections::HashSet::new();
    let mut lines = 0;
    for line in log.lines() {
        lines += 1;
        let value: serde_json::Value = serde_json::from_str(line).expect("line is valid JSON");
        for key in [
            "task",
            "result",
            "tool_calls",
            "reasoning",
            "success",
            "confidence",
            "reward",
            "verification",
            "route",
            "timestamp",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        for component in ["uncertainty", "tool_use", "novelty", "correctness", "total"] {
            assert!(value["reward"].get(component).is_some());
        }
        assert!(value["task"]["verifier"]["kind"].is_string());
        let id = value["task"]["task_id"].as_str().unwrap().to_string();
        assert!(seen_ids.insert(id), "duplicate task id");
    }
    assert_eq!(lines, 5);
}

// Reward totals on emitted trajectories equal the weighted component sum
// under the default weights.
#[tokio::test]
async fn reward_total_matches_weighted_sum() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = ScriptedEndpoint::new(|prompt, _| match solve_linear_prompt(prompt) {
        Some((equation, x)) => format!("Tool: math\nToolInput: {equation}\nAnswer: {x}"),
        None => "Answer: 0".to_string(),
    });
    let cfg = config(dir.path());
    let weights = cfg.rewards.clone();
    let mut coordinator = Coordinator::with_endpoint(cfg, endpoint).await.unwrap();

    let trajectory = coordinator
        .run_once(StepOverrides {
            domain: Some(Domain::Math),
            difficulty: Some(0.2),
            ..StepOverrides::default()
        })
        .await
        .expect("step should emit a trajectory");

    let reward = &trajectory.reward;
    let expected = weights.weight_uncertainty * reward.uncertainty
        + weights.weight_tool_use * reward.tool_use
        + weights.weight_novelty * reward.novelty
        + weights.weight_correctness * reward.correctness;
    assert!((reward.total - expected).abs() < 1e-9);
}
