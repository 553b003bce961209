//! HTTP embedding backend.
//!
//! Speaks the common text-embedding inference contract: POST the batch of
//! texts as `{"inputs": [...]}`, receive one float vector per input.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::normalize::l2_normalize_in_place;
use crate::{EmbeddingModel, SemanticConfig, SemanticError};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
    dimension: usize,
    normalize: bool,
}

impl HttpEmbedder {
    pub fn from_config(cfg: &SemanticConfig) -> Result<Self, SemanticError> {
        cfg.validate()?;
        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or_else(|| SemanticError::InvalidConfig("endpoint is required".into()))?;
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| SemanticError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            model_name: cfg.model_name.clone(),
            dimension: cfg.dimension,
            normalize: cfg.normalize,
        })
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbedder {
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), endpoint = %self.endpoint, "embedding batch");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await
            .map_err(|e| SemanticError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SemanticError::Api(format!("{status}: {body}")));
        }

        let mut vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| SemanticError::Api(format!("bad embedding payload: {e}")))?;

        if vectors.len() != texts.len() {
            return Err(SemanticError::Api(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &mut vectors {
            if v.len() != self.dimension {
                return Err(SemanticError::DimensionMismatch {
                    expected: self.dimension,
                    got: v.len(),
                });
            }
            if self.normalize {
                l2_normalize_in_place(v);
            }
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
