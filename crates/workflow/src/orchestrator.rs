//! The workflow orchestrator.
//!
//! Advances each document through the fixed stage sequence, fanning out
//! across documents per stage while keeping stages strictly ordered per
//! document. All in-memory state derives from persisted stage-run rows, so a
//! restarted process picks up from the store.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use domain::{PipelineStage, StageStatus, WorkflowStatus};
use llm::RetryConfig;
use store::WorkflowRepository;

use crate::{StageError, StageRunner, WorkflowError};

/// Orchestration knobs. The per-LLM-call timeout lives in the LLM client;
/// the stage envelope bounds a whole document-stage execution.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper envelope for one document-stage execution. Default 30 minutes.
    pub stage_timeout: Duration,
    /// Transient-failure retries per document stage. Default 3.
    pub max_retries: u32,
    /// Backoff shape for those retries.
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30 * 60),
            max_retries: 3,
            retry: RetryConfig::default(),
        }
    }
}

pub struct WorkflowOrchestrator {
    workflow_repo: WorkflowRepository,
    config: OrchestratorConfig,
}

impl WorkflowOrchestrator {
    pub fn new(workflow_repo: WorkflowRepository, config: OrchestratorConfig) -> Self {
        Self {
            workflow_repo,
            config,
        }
    }

    /// Run all stages of a workflow to completion (or cancellation).
    ///
    /// Returns the final workflow status. Partial-failure semantics: a
    /// failing document drops out of later stages but does not abort the
    /// workflow unless every document fails at the same stage.
    pub async fn run_workflow(
        &self,
        workflow_id: Uuid,
        runner: Arc<dyn StageRunner>,
        cancel: CancellationToken,
    ) -> Result<WorkflowStatus, WorkflowError> {
        let documents: Vec<Uuid> = self
            .workflow_repo
            .documents(workflow_id)
            .await?
            .into_iter()
            .map(|wd| wd.document_id)
            .collect();
        if documents.is_empty() {
            return Err(WorkflowError::NoDocuments(workflow_id));
        }

        self.workflow_repo
            .ensure_stage_runs(workflow_id, &documents)
            .await?;
        self.workflow_repo
            .update_status(workflow_id, WorkflowStatus::Running)
            .await?;
        info!(%workflow_id, documents = documents.len(), "workflow started");

        let mut failed_documents: HashSet<Uuid> = HashSet::new();
        let mut fatal: Option<String> = None;

        'stages: for stage in PipelineStage::ALL {
            let alive: Vec<Uuid> = documents
                .iter()
                .copied()
                .filter(|d| !failed_documents.contains(d))
                .collect();

            if alive.is_empty() {
                break;
            }

            // Documents that already failed skip this stage; their rows go
            // terminal so the aggregate can settle.
            for document_id in documents.iter().filter(|d| failed_documents.contains(d)) {
                self.workflow_repo
                    .mark_document_stage_terminal(
                        workflow_id,
                        *document_id,
                        stage,
                        StageStatus::Failed,
                        Some("skipped: earlier stage failed"),
                        None,
                    )
                    .await?;
            }

            let mut join_set: JoinSet<(Uuid, StageStatus, Option<String>)> = JoinSet::new();
            for document_id in &alive {
                let repo = self.workflow_repo.clone();
                let runner = Arc::clone(&runner);
                let cancel = cancel.clone();
                let config = self.config.clone();
                let document_id = *document_id;
                join_set.spawn(async move {
                    run_document_stage(repo, runner, config, workflow_id, document_id, stage, cancel)
                        .await
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (document_id, status, error_message) = match joined {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        error!(%workflow_id, error = %join_err, "document stage task panicked");
                        continue;
                    }
                };
                if status == StageStatus::Failed {
                    failed_documents.insert(document_id);
                    if let Some(message) = &error_message {
                        if message.starts_with("fatal:") {
                            fatal = Some(message.clone());
                        }
                    }
                }
                self.emit_progress(workflow_id, document_id, stage, status, error_message)
                    .await?;
            }

            let aggregate = self
                .workflow_repo
                .recompute_stage_aggregate(workflow_id, stage)
                .await?;
            info!(%workflow_id, stage = %stage, aggregate = %aggregate, "stage aggregate updated");

            if fatal.is_some() {
                break 'stages;
            }
            // All documents failing the same stage aborts the workflow.
            if failed_documents.len() == documents.len() {
                warn!(%workflow_id, stage = %stage, "all documents failed, aborting workflow");
                break 'stages;
            }
        }

        let status = if let Some(message) = fatal {
            error!(%workflow_id, message, "workflow halted on fatal error");
            self.workflow_repo
                .update_status(workflow_id, WorkflowStatus::Failed)
                .await?;
            WorkflowStatus::Failed
        } else if failed_documents.len() == documents.len() {
            self.workflow_repo
                .update_status(workflow_id, WorkflowStatus::Failed)
                .await?;
            WorkflowStatus::Failed
        } else {
            self.workflow_repo.rollup_status(workflow_id).await?
        };

        self.workflow_repo
            .emit_run_event(
                workflow_id,
                "workflow:finished",
                Some(json!({"status": status.as_str()})),
            )
            .await?;
        info!(%workflow_id, status = %status, "workflow finished");
        Ok(status)
    }

    async fn emit_progress(
        &self,
        workflow_id: Uuid,
        document_id: Uuid,
        stage: PipelineStage,
        status: StageStatus,
        error_message: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.workflow_repo
            .emit_run_event(
                workflow_id,
                "workflow:progress",
                Some(json!({
                    "stage": stage.as_str(),
                    "document_id": document_id,
                    "status": status.as_str(),
                    "error_message": error_message,
                })),
            )
            .await?;
        Ok(())
    }
}

/// Execute one `(workflow, document, stage)` with retry, timeout, and
/// cooperative cancellation. Always leaves the stage-run row terminal.
async fn run_document_stage(
    repo: WorkflowRepository,
    runner: Arc<dyn StageRunner>,
    config: OrchestratorConfig,
    workflow_id: Uuid,
    document_id: Uuid,
    stage: PipelineStage,
    cancel: CancellationToken,
) -> (Uuid, StageStatus, Option<String>) {
    if cancel.is_cancelled() {
        let _ = repo
            .mark_document_stage_terminal(
                workflow_id,
                document_id,
                stage,
                StageStatus::Failed,
                Some("cancelled"),
                None,
            )
            .await;
        return (document_id, StageStatus::Failed, Some("cancelled".into()));
    }

    if let Err(err) = repo
        .mark_document_stage_running(workflow_id, document_id, stage)
        .await
    {
        error!(%workflow_id, %document_id, stage = %stage, error = %err, "failed to mark stage running");
        return (document_id, StageStatus::Failed, Some(err.to_string()));
    }

    let mut last_error: Option<String> = None;
    for attempt in 0..=config.max_retries {
        let delay = config.retry.calculate_delay(attempt);
        if delay > Duration::from_millis(0) {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_cancelled() {
            last_error = Some("cancelled".into());
            break;
        }

        let outcome = tokio::time::timeout(
            config.stage_timeout,
            runner.run_stage(stage, workflow_id, document_id, &cancel),
        )
        .await;

        match outcome {
            Ok(Ok(metadata)) => {
                let terminal = repo
                    .mark_document_stage_terminal(
                        workflow_id,
                        document_id,
                        stage,
                        StageStatus::Completed,
                        None,
                        metadata,
                    )
                    .await;
                if let Err(err) = terminal {
                    error!(%workflow_id, %document_id, error = %err, "failed to record stage completion");
                    return (document_id, StageStatus::Failed, Some(err.to_string()));
                }
                return (document_id, StageStatus::Completed, None);
            }
            Ok(Err(StageError::Cancelled)) => {
                last_error = Some("cancelled".into());
                break;
            }
            Ok(Err(StageError::Transient(message))) => {
                warn!(
                    %workflow_id, %document_id, stage = %stage, attempt,
                    message, "transient stage failure"
                );
                last_error = Some(message);
                continue;
            }
            Ok(Err(StageError::Fatal(message))) => {
                last_error = Some(format!("fatal: {message}"));
                break;
            }
            Ok(Err(StageError::Failed(message))) => {
                last_error = Some(message);
                break;
            }
            Err(_) => {
                last_error = Some(format!(
                    "stage timed out after {} seconds",
                    config.stage_timeout.as_secs()
                ));
                break;
            }
        }
    }

    let message = last_error.unwrap_or_else(|| "stage failed".into());
    let _ = repo
        .mark_document_stage_terminal(
            workflow_id,
            document_id,
            stage,
            StageStatus::Failed,
            Some(&message),
            None,
        )
        .await;
    (document_id, StageStatus::Failed, Some(message))
}
