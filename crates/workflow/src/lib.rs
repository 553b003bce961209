//! Durable, multi-stage workflow orchestration.
//!
//! The orchestrator advances each document through the fixed stage sequence
//! (processed, classified, extracted, enriched, summarized), recording
//! per-document progress and computing the per-workflow aggregate under a
//! row lock. Stage logic itself is injected through [`StageRunner`]; this
//! crate owns ordering, retries, timeouts, cancellation, compensation, and
//! the polled event stream.

pub mod compensation;
pub mod events;
pub mod orchestrator;

pub use compensation::{CompensationRunner, CompensationStats};
pub use events::{
    format_stage_message, EventSubscription, WorkflowEvent, WorkflowEventType,
    DEFAULT_POLL_INTERVAL,
};
pub use orchestrator::{OrchestratorConfig, WorkflowOrchestrator};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use domain::PipelineStage;

/// Failure modes a stage implementation can report.
///
/// The orchestrator retries `Transient` with capped backoff, records
/// `Failed` and moves on (partial semantics), propagates `Fatal` to halt the
/// workflow and trigger compensation, and writes `Cancelled` as a failure
/// with `error_message = "cancelled"`.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("cancelled")]
    Cancelled,
    #[error("transient: {0}")]
    Transient(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<store::StoreError> for StageError {
    fn from(err: store::StoreError) -> Self {
        match err {
            store::StoreError::Transient(m) => StageError::Transient(m),
            store::StoreError::Fatal(m) => StageError::Fatal(m),
            other => StageError::Failed(other.to_string()),
        }
    }
}

impl From<llm::LlmError> for StageError {
    fn from(err: llm::LlmError) -> Self {
        if err.is_retryable() {
            StageError::Transient(err.to_string())
        } else {
            StageError::Failed(err.to_string())
        }
    }
}

/// Stage logic injected by the composition root. Implementations must check
/// the cancellation token between batched LLM calls and before repository
/// writes.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run_stage(
        &self,
        stage: PipelineStage,
        workflow_id: Uuid,
        document_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<JsonValue>, StageError>;
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error("workflow {0} has no documents")]
    NoDocuments(Uuid),
}
