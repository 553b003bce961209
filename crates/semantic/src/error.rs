use thiserror::Error;

/// Errors surfaced by embedding backends.
#[derive(Debug, Clone, Error)]
pub enum SemanticError {
    /// Configuration is inconsistent (e.g. missing endpoint for the HTTP
    /// backend).
    #[error("invalid semantic config: {0}")]
    InvalidConfig(String),
    /// The remote inference endpoint failed or returned a bad payload.
    #[error("embedding api failure: {0}")]
    Api(String),
    /// The backend returned a vector of the wrong dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Local inference failure.
    #[error("inference failure: {0}")]
    Inference(String),
}
