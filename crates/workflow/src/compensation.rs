//! Compensation for fatally failed workflows.
//!
//! Write activities have compensating counterparts; on fatal failure the
//! orchestrator unwinds the failing workflow's contributions in reverse
//! order: relationships first, then canonical entities — and only entities
//! no other workflow's scope still references.

use tracing::info;
use uuid::Uuid;

use store::{CanonicalEntityRepository, EntityRelationshipRepository, WorkflowScopeRepository};

use crate::WorkflowError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationStats {
    pub relationships_deleted: u64,
    pub entities_deleted: u64,
}

pub struct CompensationRunner {
    scope_repo: WorkflowScopeRepository,
    canonical_repo: CanonicalEntityRepository,
    relationship_repo: EntityRelationshipRepository,
}

impl CompensationRunner {
    pub fn new(
        scope_repo: WorkflowScopeRepository,
        canonical_repo: CanonicalEntityRepository,
        relationship_repo: EntityRelationshipRepository,
    ) -> Self {
        Self {
            scope_repo,
            canonical_repo,
            relationship_repo,
        }
    }

    /// Roll back the workflow's contributions. Safe to re-run; already
    /// deleted rows simply stop matching.
    pub async fn compensate_workflow(
        &self,
        workflow_id: Uuid,
    ) -> Result<CompensationStats, WorkflowError> {
        let relationship_ids = self.scope_repo.relationship_ids(workflow_id).await?;
        let relationships_deleted = self
            .relationship_repo
            .delete_many(&relationship_ids)
            .await?;

        let entity_ids = self.scope_repo.exclusive_entity_ids(workflow_id).await?;
        let entities_deleted = self.canonical_repo.delete_many(&entity_ids).await?;

        info!(
            %workflow_id,
            relationships_deleted,
            entities_deleted,
            "workflow compensation complete"
        );
        Ok(CompensationStats {
            relationships_deleted,
            entities_deleted,
        })
    }
}
