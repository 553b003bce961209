//! Embedding model contract for the docgraph pipeline.
//!
//! All dense vectors in the system come from one model family
//! (`all-MiniLM-L6-v2`, 384 dimensions, cosine distance). The model itself is
//! opaque: callers speak to an [`EmbeddingModel`], which may be backed by a
//! remote inference endpoint ([`HttpEmbedder`]) or the deterministic
//! [`HashEmbedder`] used in tests and offline runs.
//!
//! A process holds a single shared instance, lazily initialized on first use
//! (see [`SharedEmbedder`]).

pub mod config;
pub mod error;
pub mod http;
pub mod normalize;
pub mod stub;

pub use config::SemanticConfig;
pub use error::SemanticError;
pub use http::HttpEmbedder;
pub use normalize::l2_normalize_in_place;
pub use stub::HashEmbedder;

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};

/// Default model for the whole pipeline.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Dimension of the default model.
pub const DEFAULT_DIM: usize = 384;

/// Opaque embedding service: a batch of texts in, one fixed-dimension vector
/// per text out.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Encode a batch in one call. Implementations must return exactly one
    /// vector of [`EmbeddingModel::dimension`] floats per input text, in
    /// order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError>;

    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Convenience wrapper for a single text.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        let mut vectors = self.encode_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| SemanticError::Inference("model returned no outputs".into()))
    }
}

/// Process-wide lazily initialized embedder handle.
///
/// The first caller pays the initialization cost; every later caller gets the
/// same `Arc`. Initialization is serialized internally, so concurrent first
/// use is safe.
pub struct SharedEmbedder {
    cell: OnceLock<Arc<dyn EmbeddingModel>>,
}

impl SharedEmbedder {
    pub const fn new() -> Self {
        Self { cell: OnceLock::new() }
    }

    pub fn get_or_init<F>(&self, init: F) -> Arc<dyn EmbeddingModel>
    where
        F: FnOnce() -> Arc<dyn EmbeddingModel>,
    {
        self.cell.get_or_init(init).clone()
    }

    pub fn get(&self) -> Option<Arc<dyn EmbeddingModel>> {
        self.cell.get().cloned()
    }
}

impl Default for SharedEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine distance between two vectors of equal length; 0 = identical,
/// 2 = opposite. Mirrors the pgvector `<=>` operator for in-process reuse.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shared_embedder_initializes_once() {
        let shared = SharedEmbedder::new();
        let a = shared.get_or_init(|| Arc::new(HashEmbedder::default()));
        let b = shared.get_or_init(|| panic!("second init must not run"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn cosine_distance_of_identical_vectors_is_zero() {
        let v = vec![0.5f32, -0.25, 1.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_of_opposite_vectors_is_two() {
        let v = vec![1.0f32, 0.0];
        let w = vec![-1.0f32, 0.0];
        assert!((cosine_distance(&v, &w) - 2.0).abs() < 1e-6);
    }
}
