//! Scripted LLM for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{GenerationConfig, LlmClient, LlmError};

/// Replays a queue of canned responses in order; once the queue drains every
/// further call returns the fallback (default `{}`).
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: "{}".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Contents of every call made so far, for assertions on prompt shape.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("scripted llm poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("scripted llm poisoned").len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate_content(
        &self,
        contents: &str,
        _system_instruction: &str,
        _config: &GenerationConfig,
    ) -> Result<String, LlmError> {
        self.calls
            .lock()
            .expect("scripted llm poisoned")
            .push(contents.to_string());
        let next = self
            .responses
            .lock()
            .expect("scripted llm poisoned")
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_falls_back() {
        let llm = ScriptedLlm::new(["first", "second"]);
        let cfg = GenerationConfig::default();
        assert_eq!(llm.generate_content("a", "", &cfg).await.unwrap(), "first");
        assert_eq!(llm.generate_content("b", "", &cfg).await.unwrap(), "second");
        assert_eq!(llm.generate_content("c", "", &cfg).await.unwrap(), "{}");
        assert_eq!(llm.call_count(), 3);
    }
}
