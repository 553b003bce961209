//! Repository for `entity_relationships`.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{EntityRelationship, RelationshipType};

use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct EntityRelationshipRepository {
    pool: PgPool,
}

impl EntityRelationshipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist one edge. Enforces evidence totality and the reflexivity rule
    /// before touching the store.
    pub async fn create(
        &self,
        document_id: Option<Uuid>,
        source_entity_id: Uuid,
        target_entity_id: Uuid,
        relationship_type: RelationshipType,
        confidence: f64,
        attributes: JsonValue,
    ) -> StoreResult<EntityRelationship> {
        let has_evidence = attributes
            .get("evidence")
            .and_then(JsonValue::as_array)
            .map(|ev| !ev.is_empty())
            .unwrap_or(false);
        if !has_evidence {
            return Err(StoreError::Validation(
                "relationship requires at least one evidence element".into(),
            ));
        }
        if source_entity_id == target_entity_id && !relationship_type.is_reflexive() {
            return Err(StoreError::Validation(format!(
                "self-loop not allowed for {relationship_type}"
            )));
        }

        let row = sqlx::query_as::<_, EntityRelationship>(
            r#"
            INSERT INTO entity_relationships
                (id, document_id, source_entity_id, target_entity_id,
                 relationship_type, confidence, attributes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(source_entity_id)
        .bind(target_entity_id)
        .bind(relationship_type.as_str())
        .bind(confidence)
        .bind(attributes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<EntityRelationship>> {
        let rows = sqlx::query_as::<_, EntityRelationship>(
            "SELECT * FROM entity_relationships WHERE document_id = $1 ORDER BY created_at",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_by_workflow(&self, workflow_id: Uuid) -> StoreResult<Vec<EntityRelationship>> {
        let rows = sqlx::query_as::<_, EntityRelationship>(
            r#"
            SELECT er.*
            FROM entity_relationships er
            JOIN workflow_relationship_scope ws ON ws.relationship_id = er.id
            WHERE ws.workflow_id = $1
            ORDER BY er.created_at
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Adjacency fetch for bounded graph traversal: all edges touching any of
    /// the given entities, restricted to the workflow scope.
    pub async fn adjacency(
        &self,
        workflow_id: Uuid,
        entity_ids: &[Uuid],
    ) -> StoreResult<Vec<EntityRelationship>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, EntityRelationship>(
            r#"
            SELECT er.*
            FROM entity_relationships er
            JOIN workflow_relationship_scope ws ON ws.relationship_id = er.id
            WHERE ws.workflow_id = $1
              AND (er.source_entity_id = ANY($2) OR er.target_entity_id = ANY($2))
            "#,
        )
        .bind(workflow_id)
        .bind(entity_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Compensation path for a failed workflow.
    pub async fn delete_many(&self, ids: &[Uuid]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM entity_relationships WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
