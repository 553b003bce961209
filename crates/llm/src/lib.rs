//! Opaque LLM contract for the docgraph pipeline.
//!
//! Every LLM interaction in the system goes through [`LlmClient`]: a single
//! string of contents plus a system instruction in, a single string out —
//! JSON when the generation config requests `application/json`. Providers are
//! pluggable; [`client::HttpLlmClient`] is the HTTP backend with capped
//! exponential-backoff retries, and [`testing::ScriptedLlm`] replays canned
//! responses in tests.

pub mod client;
pub mod error;
pub mod json;
pub mod retry;
pub mod testing;

pub use client::HttpLlmClient;
pub use error::LlmError;
pub use json::parse_json_safely;
pub use retry::RetryConfig;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Generation parameters carried on each call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_mime_type")]
    pub response_mime_type: String,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl GenerationConfig {
    /// JSON output with the given token cap.
    pub fn json_with_cap(max_output_tokens: u32) -> Self {
        Self {
            response_mime_type: default_mime_type(),
            max_output_tokens: Some(max_output_tokens),
            temperature: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            response_mime_type: default_mime_type(),
            max_output_tokens: None,
            temperature: None,
        }
    }
}

fn default_mime_type() -> String {
    "application/json".to_string()
}

/// Client configuration for one provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    /// Per-call timeout; defaults to 90 seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.base_url.trim().is_empty() {
            return Err(LlmError::InvalidConfig("base_url must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(LlmError::InvalidConfig("model must not be empty".into()));
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    90
}

fn default_max_retries() -> u32 {
    3
}

/// Opaque LLM contract.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_content(
        &self,
        contents: &str,
        system_instruction: &str,
        config: &GenerationConfig,
    ) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_config_defaults_to_json() {
        let cfg = GenerationConfig::default();
        assert_eq!(cfg.response_mime_type, "application/json");
        assert!(cfg.max_output_tokens.is_none());
    }

    #[test]
    fn llm_config_validation() {
        let cfg = LlmConfig {
            base_url: "".into(),
            api_key: None,
            model: "m".into(),
            timeout_secs: 90,
            max_retries: 3,
        };
        assert!(cfg.validate().is_err());
    }
}
