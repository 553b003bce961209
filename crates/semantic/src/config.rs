use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DEFAULT_DIM, DEFAULT_MODEL};

/// Configuration for the embedding layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticConfig {
    /// Inference endpoint for the HTTP backend. When absent, callers fall
    /// back to the deterministic stub.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// L2-normalize vectors before returning them.
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl SemanticConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), crate::SemanticError> {
        if self.model_name.trim().is_empty() {
            return Err(crate::SemanticError::InvalidConfig(
                "model_name must not be empty".into(),
            ));
        }
        if self.dimension == 0 {
            return Err(crate::SemanticError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model_name: default_model_name(),
            dimension: default_dimension(),
            normalize: true,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_dimension() -> usize {
    DEFAULT_DIM
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SemanticConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.model_name, "all-MiniLM-L6-v2");
        assert_eq!(cfg.dimension, 384);
        assert!(cfg.normalize);
    }

    #[test]
    fn zero_dimension_rejected() {
        let cfg = SemanticConfig { dimension: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
