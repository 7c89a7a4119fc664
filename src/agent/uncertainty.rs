//! Uncertainty estimator
//!
//! Produces a calibrated success-probability estimate for a (task, answer)
//! pair. Prefers per-token logprobs when the backend exposes them; falls
//! back to averaged self-critique sampling; returns 0.5 when nothing
//! parses.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::{prompts, GenerateOptions, InferenceEndpoint};

static PROBABILITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0(?:\.\d+)?|1(?:\.0+)?").expect("static pattern"));

pub struct UncertaintyEstimator {
    endpoint: Arc<dyn InferenceEndpoint>,
    samples: usize,
    temperature: f32,
    top_p: f32,
}

impl UncertaintyEstimator {
    pub fn new(
        endpoint: Arc<dyn InferenceEndpoint>,
        samples: usize,
        temperature: f32,
        top_p: f32,
    ) -> Self {
        Self {
            endpoint,
            samples: samples.max(1),
            temperature,
            top_p,
        }
    }

    /// Estimate `p(success)` for an answer to a task. Never fails; the
    /// worst case is the uninformative 0.5.
    pub async fn estimate(&self, task_text: &str, answer: &str) -> f64 {
        if let Some(p) = self.logprob_estimate(task_text, answer).await {
            return p;
        }
        self.critique_estimate(task_text, answer).await
    }

    async fn logprob_estimate(&self, task_text: &str, answer: &str) -> Option<f64> {
        let opts = GenerateOptions {
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 1,
            seed: None,
        };
        let prompt = format!("{task_text}\nAnswer: {answer}");
        match self.endpoint.generate_with_logprobs(&prompt, &opts).await {
            Ok((_, Some(logprobs))) if !logprobs.is_empty() => {
                let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
                Some(mean.exp().clamp(0.0, 1.0))
            }
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "logprob estimate unavailable");
                None
            }
        }
    }

    async fn critique_estimate(&self, task_text: &str, answer: &str) -> f64 {
        let opts = GenerateOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: 16,
            seed: None,
        };
        let prompt = prompts::critique_prompt(task_text, answer);
        let mut parsed = Vec::new();
        for _ in 0..self.samples {
            match self.endpoint.generate(&prompt, &opts).await {
                Ok(text) => {
                    if let Some(p) = extract_probability(&text) {
                        parsed.push(p);
                    }
                }
                Err(e) => debug!(error = %e, "critique sample failed"),
            }
        }
        if parsed.is_empty() {
            return 0.5;
        }
        parsed.iter().sum::<f64>() / parsed.len() as f64
    }
}

fn extract_probability(text: &str) -> Option<f64> {
    let matched = PROBABILITY_RE.find(text)?;
    let value = matched.as_str().parse::<f64>().ok()?;
    Some(value.clamp(0.0, 1.0))
}
