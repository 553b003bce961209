//! Repositories for workflows, stage runs, and run events.
//!
//! The aggregate stage status is a pure function of the per-document rows
//! (`domain::aggregate_stage_status`); recomputation takes a row-level
//! exclusive lock on the aggregate row so two document completions cannot
//! race the read-modify-write.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{
    aggregate_stage_status, PipelineStage, StageStatus, Workflow, WorkflowDocument,
    WorkflowDocumentStageRun, WorkflowRunEvent, WorkflowStageRun, WorkflowStatus,
};

use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct WorkflowRepository {
    pool: PgPool,
}

impl WorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        workflow_name: &str,
        workflow_definition_id: Option<Uuid>,
        external_run_id: Option<&str>,
    ) -> StoreResult<Workflow> {
        if workflow_name.trim().is_empty() {
            return Err(StoreError::Validation(
                "workflow_name must not be empty".into(),
            ));
        }
        let row = sqlx::query_as::<_, Workflow>(
            r#"
            INSERT INTO workflows
                (id, workflow_definition_id, workflow_name, status, external_run_id, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_definition_id)
        .bind(workflow_name)
        .bind(external_run_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, Workflow>("SELECT * FROM workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn require(&self, id: Uuid) -> StoreResult<Workflow> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("workflow {id}")))
    }

    pub async fn update_status(&self, id: Uuid, status: WorkflowStatus) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE workflows SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("workflow {id}")));
        }
        Ok(())
    }

    pub async fn add_document(&self, workflow_id: Uuid, document_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_documents (id, workflow_id, document_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (workflow_id, document_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_id)
        .bind(document_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn documents(&self, workflow_id: Uuid) -> StoreResult<Vec<WorkflowDocument>> {
        let rows = sqlx::query_as::<_, WorkflowDocument>(
            "SELECT * FROM workflow_documents WHERE workflow_id = $1 ORDER BY created_at",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Seed pending stage-run rows for every stage and every document.
    /// Idempotent: reruns leave existing rows untouched.
    pub async fn ensure_stage_runs(
        &self,
        workflow_id: Uuid,
        document_ids: &[Uuid],
    ) -> StoreResult<()> {
        let now = Utc::now();
        for stage in PipelineStage::ALL {
            sqlx::query(
                r#"
                INSERT INTO workflow_stage_runs
                    (id, workflow_id, stage_name, status, created_at, updated_at)
                VALUES ($1, $2, $3, 'pending', $4, $4)
                ON CONFLICT (workflow_id, stage_name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(workflow_id)
            .bind(stage.as_str())
            .bind(now)
            .execute(&self.pool)
            .await?;

            for document_id in document_ids {
                sqlx::query(
                    r#"
                    INSERT INTO workflow_document_stage_runs
                        (id, workflow_id, document_id, stage_name, status, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, 'pending', $5, $5)
                    ON CONFLICT (workflow_id, document_id, stage_name) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(workflow_id)
                .bind(document_id)
                .bind(stage.as_str())
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Transition a per-document stage row to `running`. `started_at` keeps
    /// the first attempt's timestamp across retries; `completed_at` and the
    /// error message reset.
    pub async fn mark_document_stage_running(
        &self,
        workflow_id: Uuid,
        document_id: Uuid,
        stage: PipelineStage,
    ) -> StoreResult<WorkflowDocumentStageRun> {
        let row = sqlx::query_as::<_, WorkflowDocumentStageRun>(
            r#"
            UPDATE workflow_document_stage_runs
            SET status = 'running',
                started_at = COALESCE(started_at, $4),
                completed_at = NULL,
                error_message = NULL,
                updated_at = $4
            WHERE workflow_id = $1 AND document_id = $2 AND stage_name = $3
            RETURNING *
            "#,
        )
        .bind(workflow_id)
        .bind(document_id)
        .bind(stage.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Terminal transition for a per-document stage row.
    pub async fn mark_document_stage_terminal(
        &self,
        workflow_id: Uuid,
        document_id: Uuid,
        stage: PipelineStage,
        status: StageStatus,
        error_message: Option<&str>,
        stage_metadata: Option<JsonValue>,
    ) -> StoreResult<WorkflowDocumentStageRun> {
        if !matches!(status, StageStatus::Completed | StageStatus::Failed) {
            return Err(StoreError::Validation(format!(
                "per-document terminal status must be completed or failed, got {status}"
            )));
        }
        let row = sqlx::query_as::<_, WorkflowDocumentStageRun>(
            r#"
            UPDATE workflow_document_stage_runs
            SET status = $4,
                completed_at = $5,
                error_message = $6,
                stage_metadata = COALESCE($7, stage_metadata),
                updated_at = $5
            WHERE workflow_id = $1 AND document_id = $2 AND stage_name = $3
            RETURNING *
            "#,
        )
        .bind(workflow_id)
        .bind(document_id)
        .bind(stage.as_str())
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(error_message)
        .bind(stage_metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn document_stage_runs(
        &self,
        workflow_id: Uuid,
    ) -> StoreResult<Vec<WorkflowDocumentStageRun>> {
        let rows = sqlx::query_as::<_, WorkflowDocumentStageRun>(
            r#"
            SELECT * FROM workflow_document_stage_runs
            WHERE workflow_id = $1
            ORDER BY started_at NULLS LAST, created_at
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn document_stage_runs_for_stage(
        &self,
        workflow_id: Uuid,
        stage: PipelineStage,
    ) -> StoreResult<Vec<WorkflowDocumentStageRun>> {
        let rows = sqlx::query_as::<_, WorkflowDocumentStageRun>(
            r#"
            SELECT * FROM workflow_document_stage_runs
            WHERE workflow_id = $1 AND stage_name = $2
            "#,
        )
        .bind(workflow_id)
        .bind(stage.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn stage_runs(&self, workflow_id: Uuid) -> StoreResult<Vec<WorkflowStageRun>> {
        let rows = sqlx::query_as::<_, WorkflowStageRun>(
            "SELECT * FROM workflow_stage_runs WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Recompute the aggregate row for one stage under `FOR UPDATE`.
    ///
    /// Returns the resulting aggregate status.
    pub async fn recompute_stage_aggregate(
        &self,
        workflow_id: Uuid,
        stage: PipelineStage,
    ) -> StoreResult<StageStatus> {
        let mut tx = self.pool.begin().await?;

        // Exclusive lock on the aggregate row serializes concurrent
        // completions of documents in the same stage.
        let aggregate = sqlx::query_as::<_, WorkflowStageRun>(
            r#"
            SELECT * FROM workflow_stage_runs
            WHERE workflow_id = $1 AND stage_name = $2
            FOR UPDATE
            "#,
        )
        .bind(workflow_id)
        .bind(stage.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let counts = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (WHERE status = 'running')
            FROM workflow_document_stage_runs
            WHERE workflow_id = $1 AND stage_name = $2
            "#,
        )
        .bind(workflow_id)
        .bind(stage.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let (total, completed, failed, running) = counts;
        let status = aggregate_stage_status(total as usize, completed as usize, failed as usize);

        let now = Utc::now();
        let started_at = if running > 0 || completed > 0 || failed > 0 {
            aggregate.started_at.or(Some(now))
        } else {
            aggregate.started_at
        };
        let completed_at = if status.is_terminal() { Some(now) } else { None };

        sqlx::query(
            r#"
            UPDATE workflow_stage_runs
            SET status = $3, started_at = $4, completed_at = $5, updated_at = $6
            WHERE workflow_id = $1 AND stage_name = $2
            "#,
        )
        .bind(workflow_id)
        .bind(stage.as_str())
        .bind(status.as_str())
        .bind(started_at)
        .bind(completed_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(status)
    }

    /// Roll the workflow status up from its aggregate stage rows.
    pub async fn rollup_status(&self, workflow_id: Uuid) -> StoreResult<WorkflowStatus> {
        let stage_runs = self.stage_runs(workflow_id).await?;
        let status = rollup_from_stage_runs(&stage_runs);
        self.update_status(workflow_id, status).await?;
        Ok(status)
    }

    /// Append a granular progress event.
    pub async fn emit_run_event(
        &self,
        workflow_id: Uuid,
        event_type: &str,
        payload: Option<JsonValue>,
    ) -> StoreResult<WorkflowRunEvent> {
        let row = sqlx::query_as::<_, WorkflowRunEvent>(
            r#"
            INSERT INTO workflow_run_events (id, workflow_id, event_type, event_payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workflow_id)
        .bind(event_type)
        .bind(payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn run_events(&self, workflow_id: Uuid) -> StoreResult<Vec<WorkflowRunEvent>> {
        let rows = sqlx::query_as::<_, WorkflowRunEvent>(
            "SELECT * FROM workflow_run_events WHERE workflow_id = $1 ORDER BY created_at",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Pure rollup of workflow status from aggregate stage rows.
///
/// Every stage completed means completed; any failed stage fails the
/// workflow; if all stages reached a terminal state and any is partial, the
/// workflow is partial; otherwise it is still running.
pub fn rollup_from_stage_runs(stage_runs: &[WorkflowStageRun]) -> WorkflowStatus {
    if stage_runs.is_empty() {
        return WorkflowStatus::Pending;
    }
    if stage_runs.iter().any(|r| r.status == StageStatus::Failed) {
        return WorkflowStatus::Failed;
    }
    if stage_runs.iter().all(|r| r.status == StageStatus::Completed) {
        return WorkflowStatus::Completed;
    }
    let all_terminal = stage_runs.iter().all(|r| r.status.is_terminal());
    if all_terminal && stage_runs.iter().any(|r| r.status == StageStatus::Partial) {
        return WorkflowStatus::Partial;
    }
    WorkflowStatus::Running
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stage_run(stage: PipelineStage, status: StageStatus) -> WorkflowStageRun {
        WorkflowStageRun {
            id: Uuid::new_v4(),
            workflow_id: Uuid::nil(),
            stage_name: stage,
            status,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rollup_completed_when_all_stages_completed() {
        let runs: Vec<_> = PipelineStage::ALL
            .iter()
            .map(|s| stage_run(*s, StageStatus::Completed))
            .collect();
        assert_eq!(rollup_from_stage_runs(&runs), WorkflowStatus::Completed);
    }

    #[test]
    fn rollup_partial_when_terminal_with_partial_stage() {
        let mut runs: Vec<_> = PipelineStage::ALL
            .iter()
            .map(|s| stage_run(*s, StageStatus::Completed))
            .collect();
        runs[2].status = StageStatus::Partial;
        assert_eq!(rollup_from_stage_runs(&runs), WorkflowStatus::Partial);
    }

    #[test]
    fn rollup_running_while_later_stages_remain() {
        let mut runs: Vec<_> = PipelineStage::ALL
            .iter()
            .map(|s| stage_run(*s, StageStatus::Pending))
            .collect();
        runs[0].status = StageStatus::Partial;
        assert_eq!(rollup_from_stage_runs(&runs), WorkflowStatus::Running);
    }

    #[test]
    fn rollup_failed_dominates() {
        let mut runs: Vec<_> = PipelineStage::ALL
            .iter()
            .map(|s| stage_run(*s, StageStatus::Completed))
            .collect();
        runs[4].status = StageStatus::Failed;
        assert_eq!(rollup_from_stage_runs(&runs), WorkflowStatus::Failed);
    }
}
