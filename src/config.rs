//! Pipeline configuration.
//!
//! Per-stage config structs with serde defaults, bundled into one
//! [`PipelineConfig`] loaded from an optional `docgraph` config file with
//! `DOCGRAPH__`-prefixed environment variable overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use graph::GraphConfig;
pub use llm::LlmConfig;
pub use semantic::SemanticConfig;

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/docgraph".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

/// Orchestration knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Per-stage envelope in seconds. Default 30 minutes.
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Event stream poll interval in seconds. Default 2.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl OrchestrationConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
            max_retries: default_max_retries(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_stage_timeout_secs() -> u64 {
    30 * 60
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    2
}

/// Retrieval limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_distance: default_max_distance(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

fn default_top_k() -> usize {
    15
}

fn default_max_distance() -> f64 {
    0.7
}

fn default_max_context_tokens() -> usize {
    4000
}

/// The full pipeline configuration bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub graph: Option<GraphConfig>,
    pub llm: LlmConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl PipelineConfig {
    /// Load from an optional `docgraph` config file, overridden by
    /// `DOCGRAPH__`-prefixed environment variables (`__` separates nesting,
    /// e.g. `DOCGRAPH__STORE__DATABASE_URL`).
    pub fn load() -> Result<Self, crate::PipelineError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("docgraph").required(false))
            .add_source(config::Environment::with_prefix("DOCGRAPH").separator("__"));
        let config: PipelineConfig = builder
            .build()
            .map_err(|e| crate::PipelineError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| crate::PipelineError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let orchestration = OrchestrationConfig::default();
        assert_eq!(orchestration.stage_timeout(), Duration::from_secs(1800));
        assert_eq!(orchestration.max_retries, 3);
        assert_eq!(orchestration.poll_interval(), Duration::from_secs(2));

        let retrieval = RetrievalConfig::default();
        assert_eq!(retrieval.max_distance, 0.7);
        assert_eq!(retrieval.max_context_tokens, 4000);
    }

    #[test]
    fn semantic_defaults_use_the_shared_model() {
        let semantic = SemanticConfig::default();
        assert_eq!(semantic.model_name, domain::EMBEDDING_MODEL);
        assert_eq!(semantic.dimension, domain::EMBEDDING_DIM);
    }
}
