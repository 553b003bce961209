//! Workflows, stages, and their persisted run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Fixed, ordered pipeline stages. Enrichment is the entity/relationship
/// core; `Summarized` covers embedding, graph projection, and citations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Processed,
    Classified,
    Extracted,
    Enriched,
    Summarized,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::Processed,
        PipelineStage::Classified,
        PipelineStage::Extracted,
        PipelineStage::Enriched,
        PipelineStage::Summarized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Processed => "processed",
            PipelineStage::Classified => "classified",
            PipelineStage::Extracted => "extracted",
            PipelineStage::Enriched => "enriched",
            PipelineStage::Summarized => "summarized",
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<PipelineStage> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl TryFrom<String> for PipelineStage {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == value)
            .ok_or(crate::DomainError::UnknownStage(value))
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow-level status, including the `partial` aggregate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Partial => "partial",
            WorkflowStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Partial | WorkflowStatus::Failed
        )
    }
}

impl TryFrom<String> for WorkflowStatus {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(WorkflowStatus::Pending),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "partial" => Ok(WorkflowStatus::Partial),
            "failed" => Ok(WorkflowStatus::Failed),
            other => Err(crate::DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one stage run.
///
/// Per-document rows only ever hold `pending | running | completed | failed`;
/// `Partial` exists so workflow-level aggregate rows and historical data
/// round-trip through the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Partial => "partial",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Partial | StageStatus::Failed
        )
    }
}

impl TryFrom<String> for StageStatus {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(StageStatus::Pending),
            "running" => Ok(StageStatus::Running),
            "completed" => Ok(StageStatus::Completed),
            "partial" => Ok(StageStatus::Partial),
            "failed" => Ok(StageStatus::Failed),
            other => Err(crate::DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate rule for a workflow-level stage over its per-document rows.
///
/// With `completed == total` the stage is completed; when every row is
/// terminal and at least one failed, the stage is partial; otherwise it is
/// still running.
pub fn aggregate_stage_status(total: usize, completed: usize, failed: usize) -> StageStatus {
    if total > 0 && completed == total {
        StageStatus::Completed
    } else if total > 0 && completed + failed == total && failed > 0 {
        StageStatus::Partial
    } else {
        StageStatus::Running
    }
}

/// One logical run over one or more documents.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workflow {
    pub id: Uuid,
    pub workflow_definition_id: Option<Uuid>,
    pub workflow_name: String,
    #[sqlx(try_from = "String")]
    pub status: WorkflowStatus,
    /// Handle of the external durable-workflow run, when one exists.
    pub external_run_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join from workflow to document; batch workflows hold one row per document.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowDocument {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub document_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Aggregate status of one stage across all documents in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowStageRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    #[sqlx(try_from = "String")]
    pub stage_name: PipelineStage,
    #[sqlx(try_from = "String")]
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-document status for one stage in one workflow.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowDocumentStageRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub document_id: Uuid,
    #[sqlx(try_from = "String")]
    pub stage_name: PipelineStage,
    #[sqlx(try_from = "String")]
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub stage_metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only granular progress record, keyed by id for event dedup.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowRunEvent {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub event_type: String,
    pub event_payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ordering_is_fixed() {
        assert!(PipelineStage::Processed < PipelineStage::Classified);
        assert!(PipelineStage::Enriched < PipelineStage::Summarized);
        assert_eq!(PipelineStage::Processed.next(), Some(PipelineStage::Classified));
        assert_eq!(PipelineStage::Summarized.next(), None);
    }

    #[test]
    fn aggregate_rule_completed() {
        assert_eq!(aggregate_stage_status(3, 3, 0), StageStatus::Completed);
    }

    #[test]
    fn aggregate_rule_partial() {
        assert_eq!(aggregate_stage_status(3, 2, 1), StageStatus::Partial);
        assert_eq!(aggregate_stage_status(2, 0, 2), StageStatus::Partial);
    }

    #[test]
    fn aggregate_rule_running_otherwise() {
        assert_eq!(aggregate_stage_status(3, 2, 0), StageStatus::Running);
        assert_eq!(aggregate_stage_status(3, 0, 0), StageStatus::Running);
        assert_eq!(aggregate_stage_status(0, 0, 0), StageStatus::Running);
    }

    #[test]
    fn stage_parse_round_trip() {
        for stage in PipelineStage::ALL {
            let parsed = PipelineStage::try_from(stage.as_str().to_string()).unwrap();
            assert_eq!(parsed, stage);
        }
        assert!(PipelineStage::try_from("indexed".to_string()).is_err());
    }
}
