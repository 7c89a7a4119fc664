//! Run configuration
//!
//! Structured configuration for one co-evolution run. Every section has
//! serde defaults so a partial document deserializes into a runnable
//! config; `Config::validate` is the startup gate that turns a bad value
//! into a fatal `ConfigInvalid`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoevoError;
use crate::tasks::Domain;

/// Configuration for one model endpoint (teacher or student).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Backend tag: "ollama" or "openai" (OpenAI-compatible HTTP).
    pub backend: String,
    pub model: String,
    pub host: String,
    pub context_length: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Self-critique samples used by the uncertainty estimator.
    pub uncertainty_samples: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: "qwen2.5:3b".to_string(),
            host: "http://localhost:11434".to_string(),
            context_length: 4096,
            temperature: 0.6,
            top_p: 0.9,
            uncertainty_samples: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub teacher: ModelConfig,
    pub student: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    pub device: String,
    pub max_gpu_memory_gb: f64,
    pub num_threads: usize,
    pub max_tokens_per_task: u32,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            max_gpu_memory_gb: 0.0,
            num_threads: 1,
            max_tokens_per_task: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolingConfig {
    pub enable_python: bool,
    pub enable_shell: bool,
    pub enable_math: bool,
    pub enable_tests: bool,
    pub timeout_seconds: u64,
    pub workdir: PathBuf,
    /// Allowlisted command heads for the shell tool.
    pub allowed_shell: Vec<String>,
}

impl Default for ToolingConfig {
    fn default() -> Self {
        Self {
            enable_python: true,
            enable_shell: false,
            enable_math: true,
            enable_tests: false,
            timeout_seconds: 30,
            workdir: PathBuf::from("./sandbox"),
            allowed_shell: vec![
                "echo".to_string(),
                "cat".to_string(),
                "ls".to_string(),
                "wc".to_string(),
                "head".to_string(),
                "tail".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub weight_uncertainty: f64,
    pub weight_tool_use: f64,
    pub weight_novelty: f64,
    pub weight_correctness: f64,
    pub target_success_rate: f64,
    pub repetition_similarity_threshold: f64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            weight_uncertainty: 0.5,
            weight_tool_use: 0.3,
            weight_novelty: 0.2,
            weight_correctness: 0.3,
            target_success_rate: 0.5,
            repetition_similarity_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    pub enable_frontier: bool,
    pub target_success: f64,
    /// Half-width of the dead band around the target success rate.
    pub frontier_window: f64,
    pub domains: Vec<Domain>,
    pub window_size: usize,
    /// Probability of exploring the second-best domain instead of the best.
    pub epsilon: f64,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            enable_frontier: true,
            target_success: 0.5,
            frontier_window: 0.1,
            domains: vec![Domain::Math, Domain::Logic, Domain::Code],
            window_size: 20,
            epsilon: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub enable: bool,
    pub num_samples: usize,
    pub confidence_threshold: f64,
    pub enable_cot: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enable: false,
            num_samples: 3,
            confidence_threshold: 0.7,
            enable_cot: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub enable: bool,
    pub cloud_confidence_threshold: f64,
    pub local_confidence_threshold: f64,
    pub cache_path: PathBuf,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enable: false,
            cloud_confidence_threshold: 0.7,
            local_confidence_threshold: 0.4,
            cache_path: PathBuf::from("runs/router_cache.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Prefer the endpoint's embedding surface over the n-gram fallback.
    pub use_transformer: bool,
    pub model_name: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            use_transformer: true,
            model_name: "all-minilm".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub max_tasks_per_minute: usize,
    pub max_tasks_per_hour: usize,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_minute: 30,
            max_tasks_per_hour: 1000,
        }
    }
}

/// Advisory limits; enforced only insofar as the tool runner can.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    pub max_memory_mb: u64,
    pub max_cpu_seconds: u64,
    pub max_output_kb: usize,
}

impl Default for ResourceLimitsConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            max_cpu_seconds: 5,
            max_output_kb: 64,
        }
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelsConfig,
    pub resources: ResourcesConfig,
    pub tooling: ToolingConfig,
    pub rewards: RewardsConfig,
    pub curriculum: CurriculumConfig,
    pub verification: VerificationConfig,
    pub router: RouterConfig,
    pub embedding: EmbeddingConfig,
    pub rate_limits: RateLimitsConfig,
    pub resource_limits: ResourceLimitsConfig,
    pub run_dir: RunDir,
}

/// Directory holding all persisted run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunDir(pub PathBuf);

impl Default for RunDir {
    fn default() -> Self {
        RunDir(PathBuf::from("runs"))
    }
}

impl Config {
    /// Startup validation. Any violation is fatal.
    pub fn validate(&self) -> Result<(), CoevoError> {
        fn unit(path: &str, v: f64) -> Result<(), CoevoError> {
            if !(0.0..=1.0).contains(&v) || !v.is_finite() {
                return Err(CoevoError::ConfigInvalid {
                    path: path.to_string(),
                    reason: format!("{v} is outside [0, 1]"),
                });
            }
            Ok(())
        }
        fn non_negative(path: &str, v: f64) -> Result<(), CoevoError> {
            if !v.is_finite() || v < 0.0 {
                return Err(CoevoError::ConfigInvalid {
                    path: path.to_string(),
                    reason: format!("{v} must be a finite non-negative number"),
                });
            }
            Ok(())
        }

        for (name, model) in [
            ("models.teacher", &self.models.teacher),
            ("models.student", &self.models.student),
        ] {
            if model.model.is_empty() {
                return Err(CoevoError::ConfigInvalid {
                    path: format!("{name}.model"),
                    reason: "model name is empty".to_string(),
                });
            }
            if !(0.0..=2.0).contains(&model.temperature) {
                return Err(CoevoError::ConfigInvalid {
                    path: format!("{name}.temperature"),
                    reason: format!("{} is outside [0, 2]", model.temperature),
                });
            }
            if !(0.0..=1.0).contains(&model.top_p) {
                return Err(CoevoError::ConfigInvalid {
                    path: format!("{name}.top_p"),
                    reason: format!("{} is outside [0, 1]", model.top_p),
                });
            }
            if model.uncertainty_samples == 0 {
                return Err(CoevoError::ConfigInvalid {
                    path: format!("{name}.uncertainty_samples"),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        non_negative("rewards.weight_uncertainty", self.rewards.weight_uncertainty)?;
        non_negative("rewards.weight_tool_use", self.rewards.weight_tool_use)?;
        non_negative("rewards.weight_novelty", self.rewards.weight_novelty)?;
        non_negative("rewards.weight_correctness", self.rewards.weight_correctness)?;
        unit("rewards.target_success_rate", self.rewards.target_success_rate)?;
        unit(
            "rewards.repetition_similarity_threshold",
            self.rewards.repetition_similarity_threshold,
        )?;

        unit("curriculum.target_success", self.curriculum.target_success)?;
        unit("curriculum.frontier_window", self.curriculum.frontier_window)?;
        unit("curriculum.epsilon", self.curriculum.epsilon)?;
        if self.curriculum.domains.is_empty() {
            return Err(CoevoError::ConfigInvalid {
                path: "curriculum.domains".to_string(),
                reason: "at least one domain is required".to_string(),
            });
        }
        if self.curriculum.window_size == 0 {
            return Err(CoevoError::ConfigInvalid {
                path: "curriculum.window_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.verification.num_samples == 0 {
            return Err(CoevoError::ConfigInvalid {
                path: "verification.num_samples".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        unit(
            "verification.confidence_threshold",
            self.verification.confidence_threshold,
        )?;
        unit(
            "router.cloud_confidence_threshold",
            self.router.cloud_confidence_threshold,
        )?;
        unit(
            "router.local_confidence_threshold",
            self.router.local_confidence_threshold,
        )?;

        if self.tooling.timeout_seconds == 0 {
            return Err(CoevoError::ConfigInvalid {
                path: "tooling.timeout_seconds".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.rate_limits.max_tasks_per_minute == 0 || self.rate_limits.max_tasks_per_hour == 0 {
            return Err(CoevoError::ConfigInvalid {
                path: "rate_limits".to_string(),
                reason: "task budgets must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}
