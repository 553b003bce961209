use thiserror::Error;

/// Errors surfaced by LLM clients.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("invalid llm config: {0}")]
    InvalidConfig(String),
    /// Transport or provider failure; may be retryable.
    #[error("llm api failure: {0}")]
    Api(String),
    /// The per-call timeout elapsed.
    #[error("llm call timed out after {0} seconds")]
    Timeout(u64),
    /// The provider answered but the payload was not usable JSON even after
    /// a repair retry.
    #[error("llm response parse failure: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Api(message) => crate::retry::is_retryable_error(message),
            _ => false,
        }
    }
}
