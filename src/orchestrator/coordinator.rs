//! Coordinator
//!
//! Drives one co-evolution step end to end: scheduler signal, task
//! generation, tool-mediated solving, verification, uncertainty, novelty,
//! reward, persistence, scheduler update. Every fault from the middle of
//! the pipeline is caught here and turned into a skipped step; the
//! scheduler transitions themselves never raise.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::{create_endpoint, InferenceEndpoint, Solver, UncertaintyEstimator};
use crate::config::Config;
use crate::curriculum::CurriculumScheduler;
use crate::error::CoevoError;
use crate::memory::{Embedder, NoveltyIndex};
use crate::rewards::RewardEngine;
use crate::router::ConfidenceRouter;
use crate::safety::{
    SecurityEvent, SecurityEventKind, SecurityEventLog, Severity, TaskRateLimiter,
};
use crate::storage::TrajectoryLog;
use crate::tasks::{
    Domain, PromptOverride, TaskGenerator, TaskSignal, Trajectory, VerdictStatus, Verifier,
};
use crate::tools::{ToolContext, ToolRegistry};
use crate::utils::stable_hash;

/// Caller-supplied overrides merged over the scheduler signal. Explicit
/// fields win.
#[derive(Debug, Clone, Default)]
pub struct StepOverrides {
    pub next_task_id: Option<String>,
    pub domain: Option<Domain>,
    pub difficulty: Option<f64>,
    pub prompt_override: Option<PromptOverride>,
}

pub struct Coordinator {
    run_id: Uuid,
    config: Config,
    generator: TaskGenerator,
    solver: Solver,
    verifier: Verifier,
    uncertainty: UncertaintyEstimator,
    embedder: Embedder,
    novelty: NoveltyIndex,
    rewards: RewardEngine,
    scheduler: CurriculumScheduler,
    limiter: TaskRateLimiter,
    log: TrajectoryLog,
    router: ConfidenceRouter,
    events: Arc<SecurityEventLog>,
}

impl Coordinator {
    /// Build a coordinator against the configured student endpoint.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let endpoint = create_endpoint(&config.models.student)?;
        Self::with_endpoint(config, endpoint).await
    }

    /// Build with an injected endpoint (tests, alternative backends).
    pub async fn with_endpoint(
        config: Config,
        endpoint: Arc<dyn InferenceEndpoint>,
    ) -> Result<Self> {
        config.validate()?;
        let run_dir = config.run_dir.0.clone();
        std::fs::create_dir_all(&run_dir)?;

        let events = Arc::new(SecurityEventLog::new(&run_dir));
        let ctx = ToolContext::new(&config.tooling, &config.resource_limits);
        let registry =
            Arc::new(ToolRegistry::from_config(&config.tooling, Some(events.clone())).await);

        let solver = Solver::new(
            endpoint.clone(),
            registry,
            ctx.clone(),
            &config.models.student,
            config.verification.clone(),
            config.resources.max_tokens_per_task,
        );
        let uncertainty = UncertaintyEstimator::new(
            endpoint.clone(),
            config.models.student.uncertainty_samples,
            0.2,
            config.models.student.top_p,
        );
        let embedder = if config.embedding.use_transformer {
            Embedder::new(Some(endpoint))
        } else {
            Embedder::new(None)
        };

        let run_id = Uuid::new_v4();
        info!(%run_id, run_dir = %run_dir.display(), "coordinator initialized");

        Ok(Self {
            run_id,
            generator: TaskGenerator::new(),
            solver,
            verifier: Verifier::new(ctx, Some(events.clone())),
            uncertainty,
            embedder,
            novelty: NoveltyIndex::new(),
            rewards: RewardEngine::new(config.rewards.clone()),
            scheduler: CurriculumScheduler::new(config.curriculum.clone()),
            limiter: TaskRateLimiter::new(&config.rate_limits),
            log: TrajectoryLog::new(&run_dir)?,
            router: ConfidenceRouter::new(&config.router),
            events,
            config,
        })
    }

    pub fn scheduler(&self) -> &CurriculumScheduler {
        &self.scheduler
    }

    /// Run one evolution step. Returns the emitted trajectory, or `None`
    /// when the step was skipped (rate limit, generator exhaustion, or a
    /// fault inside the pipeline). Never raises.
    pub async fn run_once(&mut self, overrides: StepOverrides) -> Option<Trajectory> {
        if let Err(e) = self.limiter.try_acquire() {
            warn!(error = %e, "step skipped: rate limited");
            self.events.record(
                SecurityEvent::new(SecurityEventKind::RateLimitExceeded, Severity::Medium, e.to_string())
                    .with_details(serde_json::json!({ "step": self.scheduler.state().step })),
            );
            return None;
        }

        // Step 1: scheduler signal merged with caller overrides.
        let mut signal = self.scheduler.next_signal();
        if let Some(domain) = overrides.domain {
            signal.domain = domain;
            signal.difficulty = self.scheduler.difficulty(domain);
            self.scheduler.set_current_domain(domain);
        }
        if let Some(difficulty) = overrides.difficulty {
            signal.difficulty = difficulty;
        }
        if let Some(next_task_id) = overrides.next_task_id {
            signal.next_task_id = next_task_id;
        }
        signal.prompt_override = overrides.prompt_override;

        let step = self.scheduler.state().step;
        match self.step_inner(&signal).await {
            Ok(trajectory) => {
                // Step 9: infallible scheduler transition.
                self.scheduler.update(trajectory.success);
                Some(trajectory)
            }
            Err(e) => {
                let (component, kind) = match e.downcast_ref::<CoevoError>() {
                    Some(err @ CoevoError::GeneratorExhausted { .. }) => {
                        warn!(step, task_id = %signal.next_task_id, reason = %err, "step skipped: generator exhausted");
                        return None;
                    }
                    Some(err) => (err.component(), err.to_string()),
                    None => ("unknown", e.to_string()),
                };
                error!(run_id = %self.run_id, step, task_id = %signal.next_task_id, component, error = %kind, "evolution step failed");
                None
            }
        }
    }

    /// Steps 2-8 of the state machine. Any error here is caught by
    /// `run_once`.
    async fn step_inner(&mut self, signal: &TaskSignal) -> Result<Trajectory> {
        let task = self.generator.generate(signal)?;

        let mut trajectory = self.solver.solve(&task).await;

        let verdict = self.verifier.verify(&task, &trajectory.result).await;
        if verdict.status == VerdictStatus::Error {
            warn!(task_id = %task.task_id, reason = %verdict.reason, "verifier error; treated as fail");
        }
        trajectory.success = verdict.passed();

        // Self-verification downgrade: a contested consensus forfeits the
        // success flag even when the modal answer verified.
        if let Some(confidence) = trajectory.verification {
            if confidence < self.config.verification.confidence_threshold && trajectory.success {
                info!(
                    task_id = %task.task_id,
                    confidence,
                    threshold = self.config.verification.confidence_threshold,
                    "consensus below threshold; downgrading success"
                );
                trajectory.success = false;
            }
        }

        let success_prob = self
            .uncertainty
            .estimate(&task.prompt, &trajectory.result)
            .await;
        trajectory.confidence = success_prob;

        // Similarity is queried strictly before this step's embedding is
        // inserted.
        let novelty_sig = format!("{}:{}", task.domain, stable_hash(&task.prompt) % 10_000);
        let embedding = self.embedder.embed(&task.prompt).await;
        let similarity = self.novelty.max_similarity(&embedding);
        self.novelty.add(embedding);

        trajectory.reward =
            self.rewards
                .compute(&trajectory, success_prob, &novelty_sig, similarity);
        trajectory.route = self.router.route(success_prob).to_string();

        self.log.append(&trajectory).await?;
        Ok(trajectory)
    }
}
