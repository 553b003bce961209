//! Repositories for entity mentions, canonical entities, evidence, and
//! workflow scope membership.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{CanonicalEntity, EntityEvidence, EntityMention, EntityType, EvidenceType};

use crate::error::{StoreError, StoreResult};

/// Keys whose values are replaced only by a strictly longer string.
const KEEP_LONGER_KEYS: [&str; 3] = ["description", "source_text", "definition_text"];

/// Monotonic attribute merge for canonical entities.
///
/// For each incoming `k -> v` (nulls skipped): set when absent; for
/// description-like keys keep the longer string; otherwise first-writer-wins.
pub fn merge_attributes(existing: &mut JsonValue, incoming: &JsonValue) -> bool {
    let Some(incoming_map) = incoming.as_object() else {
        return false;
    };
    if !existing.is_object() {
        *existing = JsonValue::Object(Default::default());
    }
    let existing_map = existing
        .as_object_mut()
        .expect("existing attributes coerced to object above");

    let mut changed = false;
    for (key, value) in incoming_map {
        if value.is_null() {
            continue;
        }
        match existing_map.get(key) {
            None => {
                existing_map.insert(key.clone(), value.clone());
                changed = true;
            }
            Some(current) if current.is_null() => {
                existing_map.insert(key.clone(), value.clone());
                changed = true;
            }
            Some(current) => {
                let keep_longer = KEEP_LONGER_KEYS.contains(&key.as_str());
                if keep_longer {
                    if let (Some(new_s), Some(cur_s)) = (value.as_str(), current.as_str()) {
                        if new_s.len() > cur_s.len() {
                            existing_map.insert(key.clone(), value.clone());
                            changed = true;
                        }
                    }
                }
                // Ordinary keys: first writer wins.
            }
        }
    }
    changed
}

#[derive(Clone)]
pub struct EntityMentionRepository {
    pool: PgPool,
}

impl EntityMentionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        document_id: Uuid,
        entity_type: &EntityType,
        mention_text: &str,
        extracted_fields: JsonValue,
        confidence: f64,
        source_document_chunk_id: Option<Uuid>,
        source_stable_chunk_id: Option<&str>,
        section_extraction_id: Option<Uuid>,
    ) -> StoreResult<EntityMention> {
        if mention_text.trim().is_empty() {
            return Err(StoreError::Validation(
                "mention_text must not be empty".into(),
            ));
        }
        let row = sqlx::query_as::<_, EntityMention>(
            r#"
            INSERT INTO entity_mentions
                (id, document_id, entity_type, mention_text, extracted_fields, confidence,
                 source_document_chunk_id, source_stable_chunk_id, section_extraction_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(entity_type.as_str())
        .bind(mention_text)
        .bind(extracted_fields)
        .bind(confidence)
        .bind(source_document_chunk_id)
        .bind(source_stable_chunk_id)
        .bind(section_extraction_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<EntityMention>> {
        let rows = sqlx::query_as::<_, EntityMention>(
            "SELECT * FROM entity_mentions WHERE document_id = $1 ORDER BY created_at",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct CanonicalEntityRepository {
    pool: PgPool,
}

impl CanonicalEntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by `(entity_type, canonical_key)` with
    /// monotonic attribute merge on re-seen keys.
    ///
    /// Writes for the same key serialize on the row lock, which together with
    /// the merge rules makes concurrent resolution safe.
    pub async fn get_or_create(
        &self,
        entity_type: &EntityType,
        canonical_key: &str,
        base_attributes: JsonValue,
    ) -> StoreResult<CanonicalEntity> {
        if canonical_key.trim().is_empty() {
            return Err(StoreError::Validation(
                "canonical_key must not be empty".into(),
            ));
        }
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, CanonicalEntity>(
            r#"
            SELECT * FROM canonical_entities
            WHERE entity_type = $1 AND canonical_key = $2
            FOR UPDATE
            "#,
        )
        .bind(entity_type.as_str())
        .bind(canonical_key)
        .fetch_optional(&mut *tx)
        .await?;

        let entity = match existing {
            Some(mut entity) => {
                if merge_attributes(&mut entity.attributes, &base_attributes) {
                    let updated = sqlx::query_as::<_, CanonicalEntity>(
                        r#"
                        UPDATE canonical_entities
                        SET attributes = $2, updated_at = $3
                        WHERE id = $1
                        RETURNING *
                        "#,
                    )
                    .bind(entity.id)
                    .bind(&entity.attributes)
                    .bind(Utc::now())
                    .fetch_one(&mut *tx)
                    .await?;
                    updated
                } else {
                    entity
                }
            }
            None => {
                let inserted = sqlx::query_as::<_, CanonicalEntity>(
                    r#"
                    INSERT INTO canonical_entities
                        (id, entity_type, canonical_key, attributes, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $5)
                    ON CONFLICT (entity_type, canonical_key) DO NOTHING
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(entity_type.as_str())
                .bind(canonical_key)
                .bind(&base_attributes)
                .bind(Utc::now())
                .fetch_optional(&mut *tx)
                .await?;

                match inserted {
                    Some(entity) => entity,
                    None => {
                        // Lost the insert race; treat the conflict as success
                        // via a get fallback and merge into the winner.
                        let mut entity = sqlx::query_as::<_, CanonicalEntity>(
                            r#"
                            SELECT * FROM canonical_entities
                            WHERE entity_type = $1 AND canonical_key = $2
                            FOR UPDATE
                            "#,
                        )
                        .bind(entity_type.as_str())
                        .bind(canonical_key)
                        .fetch_one(&mut *tx)
                        .await?;
                        if merge_attributes(&mut entity.attributes, &base_attributes) {
                            entity = sqlx::query_as::<_, CanonicalEntity>(
                                r#"
                                UPDATE canonical_entities
                                SET attributes = $2, updated_at = $3
                                WHERE id = $1
                                RETURNING *
                                "#,
                            )
                            .bind(entity.id)
                            .bind(&entity.attributes)
                            .bind(Utc::now())
                            .fetch_one(&mut *tx)
                            .await?;
                        }
                        entity
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(entity)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<CanonicalEntity>> {
        let row =
            sqlx::query_as::<_, CanonicalEntity>("SELECT * FROM canonical_entities WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    pub async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<CanonicalEntity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CanonicalEntity>(
            "SELECT * FROM canonical_entities WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Canonical entities evidenced on a document.
    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<CanonicalEntity>> {
        let rows = sqlx::query_as::<_, CanonicalEntity>(
            r#"
            SELECT DISTINCT ce.*
            FROM canonical_entities ce
            JOIN entity_evidence ev ON ev.canonical_entity_id = ce.id
            WHERE ev.document_id = $1
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Canonical entities contributed by a workflow.
    pub async fn get_by_workflow(&self, workflow_id: Uuid) -> StoreResult<Vec<CanonicalEntity>> {
        let rows = sqlx::query_as::<_, CanonicalEntity>(
            r#"
            SELECT ce.*
            FROM canonical_entities ce
            JOIN workflow_entity_scope ws ON ws.canonical_entity_id = ce.id
            WHERE ws.workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_by_canonical_keys(
        &self,
        keys: &[String],
    ) -> StoreResult<Vec<CanonicalEntity>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CanonicalEntity>(
            "SELECT * FROM canonical_entities WHERE canonical_key = ANY($1)",
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Compensation path: delete a workflow's contributed entities that have
    /// no evidence from any other workflow's documents.
    pub async fn delete_many(&self, ids: &[Uuid]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM canonical_entities WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct EntityEvidenceRepository {
    pool: PgPool,
}

impl EntityEvidenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        canonical_entity_id: Uuid,
        entity_mention_id: Uuid,
        document_id: Uuid,
        confidence: f64,
        evidence_type: EvidenceType,
    ) -> StoreResult<EntityEvidence> {
        let row = sqlx::query_as::<_, EntityEvidence>(
            r#"
            INSERT INTO entity_evidence
                (id, canonical_entity_id, entity_mention_id, document_id, confidence, evidence_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (canonical_entity_id, entity_mention_id)
            DO UPDATE SET confidence = GREATEST(entity_evidence.confidence, EXCLUDED.confidence)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(canonical_entity_id)
        .bind(entity_mention_id)
        .bind(document_id)
        .bind(confidence)
        .bind(evidence_type.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<EntityEvidence>> {
        let rows = sqlx::query_as::<_, EntityEvidence>(
            "SELECT * FROM entity_evidence WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Idempotent membership sets that scope a workflow's contributions.
#[derive(Clone)]
pub struct WorkflowScopeRepository {
    pool: PgPool,
}

impl WorkflowScopeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// No-op on conflict.
    pub async fn add_entity(&self, workflow_id: Uuid, canonical_entity_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_entity_scope (workflow_id, canonical_entity_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(workflow_id)
        .bind(canonical_entity_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_relationship(&self, workflow_id: Uuid, relationship_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_relationship_scope (workflow_id, relationship_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(workflow_id)
        .bind(relationship_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn entity_ids(&self, workflow_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            "SELECT canonical_entity_id FROM workflow_entity_scope WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn relationship_ids(&self, workflow_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            "SELECT relationship_id FROM workflow_relationship_scope WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Canonical entities contributed by this workflow and no other — the
    /// safe deletion set for compensation.
    pub async fn exclusive_entity_ids(&self, workflow_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query_as::<_, (Uuid,)>(
            r#"
            SELECT ws.canonical_entity_id
            FROM workflow_entity_scope ws
            WHERE ws.workflow_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM workflow_entity_scope other
                  WHERE other.canonical_entity_id = ws.canonical_entity_id
                    AND other.workflow_id <> $1
              )
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_sets_missing_keys() {
        let mut existing = json!({"normalized_value": "POL-1"});
        let incoming = json!({"policy_type": "property", "skip": null});
        assert!(merge_attributes(&mut existing, &incoming));
        assert_eq!(existing["policy_type"], "property");
        assert!(existing.get("skip").is_none());
    }

    #[test]
    fn merge_keeps_longer_description() {
        let mut existing = json!({"description": "short"});
        assert!(merge_attributes(
            &mut existing,
            &json!({"description": "a much longer description"})
        ));
        assert_eq!(existing["description"], "a much longer description");

        // A shorter incoming value never shrinks the stored one.
        assert!(!merge_attributes(&mut existing, &json!({"description": "tiny"})));
        assert_eq!(existing["description"], "a much longer description");
    }

    #[test]
    fn merge_is_first_writer_wins_for_ordinary_keys() {
        let mut existing = json!({"role": "carrier"});
        assert!(!merge_attributes(&mut existing, &json!({"role": "insured"})));
        assert_eq!(existing["role"], "carrier");
    }

    #[test]
    fn merge_is_monotonic_over_repeated_calls() {
        let mut existing = json!({});
        merge_attributes(&mut existing, &json!({"description": "one"}));
        let len_after_first = existing["description"].as_str().unwrap().len();
        merge_attributes(&mut existing, &json!({"description": "longer than one"}));
        let len_after_second = existing["description"].as_str().unwrap().len();
        assert!(len_after_second >= len_after_first);
        assert!(len_after_second >= "longer than one".len());
    }
}
