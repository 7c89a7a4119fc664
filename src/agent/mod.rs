//! Agent Module
//!
//! The student side: inference endpoints, reasoning-trace parsing, the
//! tool-mediated solver, self-verification and uncertainty estimation.

mod endpoint;
pub mod parser;
pub mod prompts;
mod self_verify;
mod solver;
mod uncertainty;

pub use endpoint::{create_endpoint, OllamaEndpoint, OpenAICompatibleEndpoint};
pub use parser::{parse_trace, ParsedTrace};
pub use self_verify::{consensus, normalize_answer, Consensus};
pub use solver::Solver;
pub use uncertainty::UncertaintyEstimator;

use anyhow::Result;
use async_trait::async_trait;

/// Sampling parameters for one generation request.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub seed: Option<u64>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.9,
            max_tokens: 512,
            seed: None,
        }
    }
}

/// A language-model inference endpoint. Logprobs and embeddings are
/// optional surfaces; the defaults declare them unsupported and callers
/// fall back (self-critique sampling, n-gram embeddings).
#[async_trait]
pub trait InferenceEndpoint: Send + Sync {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String>;

    /// Generated text plus per-token log-probabilities when the backend
    /// exposes them.
    async fn generate_with_logprobs(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<(String, Option<Vec<f64>>)> {
        Ok((self.generate(prompt, opts).await?, None))
    }

    /// Embedding vector for a text, when the backend offers one.
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}
