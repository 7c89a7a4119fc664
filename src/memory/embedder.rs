//! Prompt embedding
//!
//! Prefers the inference endpoint's embedding surface; when that is
//! unavailable (or disabled), a deterministic fallback hashes character
//! trigrams into a fixed-width, length-normalized vector. The fallback is
//! observable only as lower calibration quality in the novelty signal.

use std::sync::Arc;

use tracing::debug;

use crate::agent::InferenceEndpoint;
use crate::utils::stable_hash;

/// Dimensionality of the fallback n-gram vectors.
pub const FALLBACK_DIM: usize = 64;

pub struct Embedder {
    endpoint: Option<Arc<dyn InferenceEndpoint>>,
}

impl Embedder {
    /// `endpoint` is consulted first when present; pass `None` to force
    /// the deterministic fallback.
    pub fn new(endpoint: Option<Arc<dyn InferenceEndpoint>>) -> Self {
        Self { endpoint }
    }

    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(endpoint) = &self.endpoint {
            match endpoint.embed(text).await {
                Ok(Some(vector)) if !vector.is_empty() => return vector,
                Ok(_) => {}
                Err(e) => debug!(error = %e, "endpoint embedding unavailable"),
            }
        }
        fallback_embed(text)
    }
}

/// Deterministic character-trigram embedding, L2-normalized.
pub fn fallback_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; FALLBACK_DIM];
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vector;
    }
    if chars.len() < 3 {
        let bucket = (stable_hash(text) % FALLBACK_DIM as u64) as usize;
        vector[bucket] = 1.0;
        return vector;
    }
    for window in chars.windows(3) {
        let gram: String = window.iter().collect();
        let bucket = (stable_hash(&gram) % FALLBACK_DIM as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Cosine similarity; 0 for mismatched or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
