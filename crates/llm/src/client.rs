//! HTTP chat backend implementing the opaque `generate_content` contract.
//!
//! The wire shape follows the generate-content style API: contents plus an
//! optional system instruction in, one text part out. Providers are pluggable
//! behind [`LlmClient`]; the contract is a single string in, a single string
//! out (a JSON payload when `response_mime_type` asks for one).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::retry::{execute_with_retry_async, RetryConfig};
use crate::{GenerationConfig, LlmClient, LlmConfig, LlmError};

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Serialize)]
struct Part {
    text: String,
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpLlmClient {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self, LlmError> {
        cfg.validate()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            retry: RetryConfig::default().with_max_retries(cfg.max_retries),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_once(
        &self,
        contents: &str,
        system_instruction: &str,
        config: &GenerationConfig,
    ) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": contents}]}],
            "generationConfig": {
                "responseMimeType": config.response_mime_type,
            },
        });
        if !system_instruction.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system_instruction}]});
        }
        if let Some(max_tokens) = config.max_output_tokens {
            body["generationConfig"]["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temperature) = config.temperature {
            body["generationConfig"]["temperature"] = json!(temperature);
        }

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-goog-api-key", api_key);
        }

        let send = async {
            let response = request
                .send()
                .await
                .map_err(|e| LlmError::Api(e.to_string()))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api(format!("{status}: {body}")));
            }
            let payload: GenerateContentResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Api(format!("bad response payload: {e}")))?;
            payload
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text)
                .ok_or_else(|| LlmError::Api("response carried no candidates".into()))
        };

        match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate_content(
        &self,
        contents: &str,
        system_instruction: &str,
        config: &GenerationConfig,
    ) -> Result<String, LlmError> {
        debug!(model = %self.model, input_chars = contents.len(), "llm call");
        execute_with_retry_async(
            &self.retry,
            |attempt| {
                if attempt > 0 {
                    warn!(model = %self.model, attempt, "retrying llm call");
                }
                self.call_once(contents, system_instruction, config)
            },
            |err| err.is_retryable(),
        )
        .await
    }
}
