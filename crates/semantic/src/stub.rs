//! Deterministic embedding stub.
//!
//! Generates sinusoid values derived from a hash of the input text, so tests
//! and offline runs get reproducible vectors with minimal CPU cost. Same text
//! always yields the same vector; different texts diverge.

use async_trait::async_trait;
use fxhash::hash64;

use crate::normalize::l2_normalize_in_place;
use crate::{EmbeddingModel, SemanticConfig, SemanticError, DEFAULT_DIM, DEFAULT_MODEL};

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model_name: String,
    dimension: usize,
    normalize: bool,
}

impl HashEmbedder {
    pub fn new(model_name: impl Into<String>, dimension: usize, normalize: bool) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
            normalize,
        }
    }

    pub fn from_config(cfg: &SemanticConfig) -> Self {
        Self::new(cfg.model_name.clone(), cfg.dimension, cfg.normalize)
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let h = hash64(text.as_bytes());
        let mut v = vec![0f32; self.dimension];
        for (idx, value) in v.iter_mut().enumerate() {
            *value = ((h >> (idx % 32)) as f32 * 0.0001).sin();
        }
        if self.normalize {
            l2_normalize_in_place(&mut v);
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, DEFAULT_DIM, true)
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedder {
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_is_deterministic() {
        let embedder = HashEmbedder::default();
        let a = embedder.encode("same text").await.unwrap();
        let b = embedder.encode("same text").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIM);
    }

    #[tokio::test]
    async fn stub_distinguishes_text() {
        let embedder = HashEmbedder::default();
        let a = embedder.encode("hello").await.unwrap();
        let b = embedder.encode("world").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn stub_normalizes_when_asked() {
        let embedder = HashEmbedder::new(DEFAULT_MODEL, 64, true);
        let v = embedder.encode("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = HashEmbedder::default();
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.encode_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.encode("one").await.unwrap());
        assert_eq!(batch[1], embedder.encode("two").await.unwrap());
    }
}
