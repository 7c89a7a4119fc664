//! Memory Module
//!
//! Prompt embeddings and the bounded novelty index behind the
//! repetition-similarity reward signal.

pub mod embedder;
pub mod novelty;

pub use embedder::{cosine_similarity, fallback_embed, Embedder, FALLBACK_DIM};
pub use novelty::{NoveltyIndex, DEFAULT_CAPACITY};
