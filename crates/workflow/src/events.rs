//! Polled workflow event stream.
//!
//! Subscribers get the full backlog first, then updates as stage-run rows
//! and append-only run events change, with a heartbeat per poll interval
//! when nothing new appeared. The stream terminates after the workflow
//! reaches a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use domain::{PipelineStage, StageStatus, WorkflowDocumentStageRun, WorkflowStatus};
use store::WorkflowRepository;

use crate::WorkflowError;

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventType {
    Heartbeat,
    WorkflowProgress,
    StageStarted,
    StageCompleted,
    StageFailed,
    WorkflowCompleted,
    WorkflowFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub event_type: WorkflowEventType,
    pub workflow_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: JsonValue,
}

/// Human-readable progress line for a stage transition.
pub fn format_stage_message(stage: PipelineStage, status: StageStatus) -> String {
    let activity = match stage {
        PipelineStage::Processed => "Document processing",
        PipelineStage::Classified => "Section classification",
        PipelineStage::Extracted => "Structured extraction",
        PipelineStage::Enriched => "Entity and relationship enrichment",
        PipelineStage::Summarized => "Indexing and summarization",
    };
    match status {
        StageStatus::Pending => format!("{activity} queued"),
        StageStatus::Running => format!("{activity} in progress"),
        StageStatus::Completed => format!("{activity} completed"),
        StageStatus::Partial => format!("{activity} completed with failures"),
        StageStatus::Failed => format!("{activity} failed"),
    }
}

/// One subscriber's view of a workflow's event stream.
pub struct EventSubscription {
    repo: WorkflowRepository,
    workflow_id: Uuid,
    poll_interval: Duration,
    emitted_stage_states: HashSet<(Uuid, StageStatus)>,
    emitted_run_events: HashSet<Uuid>,
    backlog: VecDeque<WorkflowEvent>,
    primed: bool,
    finished: bool,
}

impl EventSubscription {
    pub fn new(repo: WorkflowRepository, workflow_id: Uuid, poll_interval: Duration) -> Self {
        Self {
            repo,
            workflow_id,
            poll_interval,
            emitted_stage_states: HashSet::new(),
            emitted_run_events: HashSet::new(),
            backlog: VecDeque::new(),
            primed: false,
            finished: false,
        }
    }

    /// Yield the next event. Returns `None` once the terminal event has been
    /// delivered.
    pub async fn next(&mut self) -> Result<Option<WorkflowEvent>, WorkflowError> {
        loop {
            if let Some(event) = self.backlog.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            if self.primed {
                // No backlog after a poll: heartbeat, then wait out the
                // interval before polling again.
                self.poll().await?;
                if self.backlog.is_empty() {
                    if self.check_terminal().await? {
                        continue;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                    return Ok(Some(self.heartbeat()));
                }
            } else {
                self.primed = true;
                self.poll().await?;
                if self.backlog.is_empty() && !self.check_terminal().await? {
                    return Ok(Some(self.heartbeat()));
                }
            }
        }
    }

    fn heartbeat(&self) -> WorkflowEvent {
        WorkflowEvent {
            event_type: WorkflowEventType::Heartbeat,
            workflow_id: self.workflow_id,
            timestamp: Utc::now(),
            data: json!({"message": "keep-alive"}),
        }
    }

    /// Derive new events from stage-run rows and run events; each
    /// `(stage_run_id, status)` and each run event id is emitted once.
    async fn poll(&mut self) -> Result<(), WorkflowError> {
        let stage_runs = self.repo.document_stage_runs(self.workflow_id).await?;
        for run in &stage_runs {
            let state_key = (run.id, run.status);
            if self.emitted_stage_states.contains(&state_key) {
                continue;
            }
            if let Some(event) = stage_event(self.workflow_id, run) {
                self.emitted_stage_states.insert(state_key);
                self.backlog.push_back(event);
            }
        }

        let run_events = self.repo.run_events(self.workflow_id).await?;
        for run_event in run_events {
            if self.emitted_run_events.contains(&run_event.id) {
                continue;
            }
            self.emitted_run_events.insert(run_event.id);
            self.backlog.push_back(WorkflowEvent {
                event_type: WorkflowEventType::WorkflowProgress,
                workflow_id: self.workflow_id,
                timestamp: run_event.created_at,
                data: run_event.event_payload.unwrap_or_else(|| json!({})),
            });
        }
        Ok(())
    }

    /// Queue the terminal event when the workflow has finished. Returns true
    /// when the stream is now draining.
    async fn check_terminal(&mut self) -> Result<bool, WorkflowError> {
        let Some(workflow) = self.repo.get(self.workflow_id).await? else {
            self.finished = true;
            return Ok(true);
        };
        if !workflow.status.is_terminal() {
            return Ok(false);
        }
        let event_type = match workflow.status {
            WorkflowStatus::Failed => WorkflowEventType::WorkflowFailed,
            _ => WorkflowEventType::WorkflowCompleted,
        };
        debug!(workflow_id = %self.workflow_id, status = %workflow.status, "workflow stream terminating");
        self.backlog.push_back(WorkflowEvent {
            event_type,
            workflow_id: self.workflow_id,
            timestamp: Utc::now(),
            data: json!({
                "status": workflow.status.as_str(),
                "message": format!("Workflow {}", workflow.status),
            }),
        });
        self.finished = true;
        Ok(true)
    }
}

/// Stage-run row to event; pending rows produce nothing yet.
fn stage_event(workflow_id: Uuid, run: &WorkflowDocumentStageRun) -> Option<WorkflowEvent> {
    let event_type = match run.status {
        StageStatus::Pending => return None,
        StageStatus::Running => WorkflowEventType::StageStarted,
        StageStatus::Completed | StageStatus::Partial => WorkflowEventType::StageCompleted,
        StageStatus::Failed => WorkflowEventType::StageFailed,
    };
    let message = format_stage_message(run.stage_name, run.status);
    let has_output = run.stage_name == PipelineStage::Extracted && run.status == StageStatus::Completed;
    Some(WorkflowEvent {
        event_type,
        workflow_id,
        timestamp: run.updated_at,
        data: json!({
            "stage_name": run.stage_name.as_str(),
            "document_id": run.document_id,
            "workflow_id": workflow_id,
            "status": run.status.as_str(),
            "message": message,
            "has_output": has_output,
            "error_message": run.error_message,
            "metadata": run.stage_metadata,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stage_run(stage: PipelineStage, status: StageStatus) -> WorkflowDocumentStageRun {
        WorkflowDocumentStageRun {
            id: Uuid::new_v4(),
            workflow_id: Uuid::nil(),
            document_id: Uuid::new_v4(),
            stage_name: stage,
            status,
            started_at: Some(Utc::now()),
            completed_at: None,
            error_message: None,
            stage_metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stage_events_map_status_to_type() {
        let wf = Uuid::nil();
        let running = stage_event(wf, &stage_run(PipelineStage::Extracted, StageStatus::Running));
        assert_eq!(running.unwrap().event_type, WorkflowEventType::StageStarted);

        let completed =
            stage_event(wf, &stage_run(PipelineStage::Extracted, StageStatus::Completed)).unwrap();
        assert_eq!(completed.event_type, WorkflowEventType::StageCompleted);
        assert_eq!(completed.data["has_output"], true);

        let failed = stage_event(wf, &stage_run(PipelineStage::Enriched, StageStatus::Failed));
        assert_eq!(failed.unwrap().event_type, WorkflowEventType::StageFailed);

        assert!(stage_event(wf, &stage_run(PipelineStage::Processed, StageStatus::Pending)).is_none());
    }

    #[test]
    fn stage_messages_read_like_progress_lines() {
        assert_eq!(
            format_stage_message(PipelineStage::Enriched, StageStatus::Running),
            "Entity and relationship enrichment in progress"
        );
        assert_eq!(
            format_stage_message(PipelineStage::Summarized, StageStatus::Failed),
            "Indexing and summarization failed"
        );
    }
}
