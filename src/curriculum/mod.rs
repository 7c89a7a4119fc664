//! Curriculum Module
//!
//! Keeps the student near a target success rate by choosing the next
//! (domain, difficulty) pair. Frontier mode scores each domain by how far
//! its windowed success rate sits from the target and mostly exploits the
//! closest one; with probability epsilon it explores the runner-up.

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CurriculumConfig;
use crate::tasks::{Domain, TaskSignal};

const DIFFICULTY_MIN: f64 = 0.1;
const DIFFICULTY_MAX: f64 = 0.9;
const DIFFICULTY_STEP: f64 = 0.05;
const INITIAL_DIFFICULTY: f64 = 0.5;
/// Domain rotation stride when frontier mode is off.
const ROTATION_STRIDE: u64 = 5;

/// Serializable scheduler state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumState {
    pub difficulty: BTreeMap<Domain, f64>,
    pub history: BTreeMap<Domain, VecDeque<bool>>,
    pub step: u64,
    pub current_domain: Domain,
}

pub struct CurriculumScheduler {
    config: CurriculumConfig,
    state: CurriculumState,
    rng: StdRng,
}

impl CurriculumScheduler {
    pub fn new(config: CurriculumConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: CurriculumConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: CurriculumConfig, rng: StdRng) -> Self {
        let difficulty = config
            .domains
            .iter()
            .map(|d| (*d, INITIAL_DIFFICULTY))
            .collect();
        let history = config
            .domains
            .iter()
            .map(|d| (*d, VecDeque::with_capacity(config.window_size)))
            .collect();
        let current_domain = config.domains[0];
        Self {
            config,
            state: CurriculumState {
                difficulty,
                history,
                step: 0,
                current_domain,
            },
            rng,
        }
    }

    pub fn state(&self) -> &CurriculumState {
        &self.state
    }

    /// Windowed success rate; the target when the window is empty.
    pub fn success_rate(&self, domain: Domain) -> f64 {
        match self.state.history.get(&domain) {
            Some(window) if !window.is_empty() => {
                window.iter().filter(|s| **s).count() as f64 / window.len() as f64
            }
            _ => self.config.target_success,
        }
    }

    pub fn difficulty(&self, domain: Domain) -> f64 {
        self.state
            .difficulty
            .get(&domain)
            .copied()
            .unwrap_or(INITIAL_DIFFICULTY)
    }

    /// Choose the next (domain, difficulty). Only `current_domain` is
    /// touched; difficulty, history and the step counter move exclusively
    /// through `update`.
    pub fn next_signal(&mut self) -> TaskSignal {
        let domain = if self.config.enable_frontier {
            self.frontier_domain()
        } else {
            let idx = (self.state.step / ROTATION_STRIDE) as usize % self.config.domains.len();
            self.config.domains[idx]
        };
        self.state.current_domain = domain;
        TaskSignal {
            domain,
            difficulty: self.difficulty(domain),
            next_task_id: format!("task-{:04}", self.state.step + 1),
            prompt_override: None,
        }
    }

    fn frontier_domain(&mut self) -> Domain {
        // Rank by distance from the target rate; ties break on the
        // lexicographic domain name.
        let mut scored: Vec<(f64, Domain)> = self
            .config
            .domains
            .iter()
            .map(|d| ((self.success_rate(*d) - self.config.target_success).abs(), *d))
            .collect();
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.as_str().cmp(b.1.as_str()))
        });

        let explore = scored.len() > 1 && self.rng.gen::<f64>() < self.config.epsilon;
        let chosen = if explore { scored[1].1 } else { scored[0].1 };
        debug!(domain = %chosen, explore, "frontier selection");
        chosen
    }

    /// Redirect the in-flight step to another domain. Used when a caller
    /// override replaces the scheduled domain, so `update` credits the
    /// window that was actually exercised.
    pub fn set_current_domain(&mut self, domain: Domain) {
        self.state.current_domain = domain;
    }

    /// Record the outcome of a step on the current domain and nudge its
    /// difficulty toward the frontier. The only mutator of difficulty,
    /// history and the step counter; it never fails.
    pub fn update(&mut self, success: bool) {
        let domain = self.state.current_domain;
        if let Some(window) = self.state.history.get_mut(&domain) {
            window.push_back(success);
            while window.len() > self.config.window_size {
                window.pop_front();
            }
        }

        let rate = self.success_rate(domain);
        if let Some(difficulty) = self.state.difficulty.get_mut(&domain) {
            if rate > self.config.target_success + self.config.frontier_window {
                *difficulty += DIFFICULTY_STEP;
            } else if rate < self.config.target_success - self.config.frontier_window {
                *difficulty -= DIFFICULTY_STEP;
            }
            *difficulty = difficulty.clamp(DIFFICULTY_MIN, DIFFICULTY_MAX);
        }

        self.state.step += 1;
    }
}
