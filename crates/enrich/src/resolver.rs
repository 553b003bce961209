//! Canonical entity resolution.
//!
//! Each candidate resolves to exactly one canonical entity via the
//! deterministic canonical key; the resolver writes the document-scoped
//! mention, the evidence row binding it to the canonical, and the workflow
//! scope membership.

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error, warn};
use uuid::Uuid;

use domain::EvidenceType;
use store::{
    CanonicalEntityRepository, DocumentChunkRepository, EntityEvidenceRepository,
    EntityMentionRepository, WorkflowScopeRepository,
};

use crate::candidate::EntityCandidate;
use crate::EnrichError;

pub struct EntityResolver {
    canonical_repo: CanonicalEntityRepository,
    mention_repo: EntityMentionRepository,
    evidence_repo: EntityEvidenceRepository,
    scope_repo: WorkflowScopeRepository,
    chunk_repo: DocumentChunkRepository,
}

impl EntityResolver {
    pub fn new(
        canonical_repo: CanonicalEntityRepository,
        mention_repo: EntityMentionRepository,
        evidence_repo: EntityEvidenceRepository,
        scope_repo: WorkflowScopeRepository,
        chunk_repo: DocumentChunkRepository,
    ) -> Self {
        Self {
            canonical_repo,
            mention_repo,
            evidence_repo,
            scope_repo,
            chunk_repo,
        }
    }

    /// Resolve one candidate to its canonical entity, creating the canonical
    /// on first sight and always recording mention + evidence.
    ///
    /// Returns the canonical entity id.
    pub async fn resolve_entity(
        &self,
        candidate: &EntityCandidate,
        chunk_id: Option<Uuid>,
        document_id: Uuid,
        workflow_id: Option<Uuid>,
    ) -> Result<Uuid, EnrichError> {
        if candidate.normalized_value.trim().is_empty() {
            warn!("invalid entity candidate, missing value");
            return Err(EnrichError::InvalidCandidate(
                "candidate must carry a normalized value".into(),
            ));
        }

        let canonical_key = candidate.canonical_key();
        let base_attributes = build_base_attributes(candidate);

        let canonical = self
            .canonical_repo
            .get_or_create(&candidate.entity_type, &canonical_key, base_attributes)
            .await?;

        // Resolve chunk provenance if the caller passed a concrete chunk.
        let (source_chunk_id, source_stable_chunk_id) = match chunk_id {
            Some(chunk_id) => match self.chunk_repo.get(chunk_id).await? {
                Some(chunk) => (Some(chunk.id), Some(chunk.stable_chunk_id)),
                None => (None, candidate.source_stable_chunk_id.clone()),
            },
            None => (
                candidate.source_chunk_id,
                candidate.source_stable_chunk_id.clone(),
            ),
        };

        let readable_name = candidate.readable_mention_text();
        if readable_name != candidate.normalized_value {
            debug!(
                entity_type = %candidate.entity_type,
                normalized_value = %candidate.normalized_value,
                readable_name = %readable_name,
                "human-readable mention text derived for evidence quote"
            );
        }

        let mut extracted_fields = Map::new();
        extracted_fields.insert(
            "normalized_value".to_string(),
            JsonValue::String(candidate.normalized_value.clone()),
        );
        extracted_fields.insert(
            "raw_value".to_string(),
            JsonValue::String(candidate.raw_value.clone()),
        );
        for (key, value) in &candidate.attributes {
            extracted_fields.insert(key.clone(), value.clone());
        }

        let mention = self
            .mention_repo
            .create(
                document_id,
                &candidate.entity_type,
                &readable_name,
                JsonValue::Object(extracted_fields),
                candidate.confidence,
                source_chunk_id,
                source_stable_chunk_id.as_deref(),
                candidate.section_extraction_id,
            )
            .await?;

        self.evidence_repo
            .create(
                canonical.id,
                mention.id,
                document_id,
                candidate.confidence,
                EvidenceType::Extracted,
            )
            .await?;

        if let Some(workflow_id) = workflow_id {
            self.scope_repo.add_entity(workflow_id, canonical.id).await?;
        }

        debug!(
            entity_type = %candidate.entity_type,
            canonical_key = %canonical_key,
            canonical_entity_id = %canonical.id,
            "resolved entity mention to canonical entity"
        );
        Ok(canonical.id)
    }

    /// Resolve a batch; failures are logged and skipped so one bad candidate
    /// cannot sink the document.
    pub async fn resolve_entities_batch(
        &self,
        candidates: &[EntityCandidate],
        chunk_id: Option<Uuid>,
        document_id: Uuid,
        workflow_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>, EnrichError> {
        let mut canonical_ids = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self
                .resolve_entity(candidate, chunk_id, document_id, workflow_id)
                .await
            {
                Ok(id) => canonical_ids.push(id),
                Err(err) => {
                    error!(
                        entity_id = %candidate.entity_id,
                        error = %err,
                        "failed to resolve entity"
                    );
                }
            }
        }
        Ok(canonical_ids)
    }
}

/// Canonical attributes seeded at creation: normalized/raw value, the stable
/// LLM-facing id, and every enriched attribute the candidate carries.
fn build_base_attributes(candidate: &EntityCandidate) -> JsonValue {
    let mut attributes = Map::new();
    attributes.insert(
        "normalized_value".to_string(),
        JsonValue::String(candidate.normalized_value.clone()),
    );
    attributes.insert(
        "raw_value".to_string(),
        JsonValue::String(candidate.raw_value.clone()),
    );
    attributes.insert(
        "id".to_string(),
        JsonValue::String(candidate.entity_id.clone()),
    );
    for (key, value) in &candidate.attributes {
        if !value.is_null() && !attributes.contains_key(key) {
            attributes.insert(key.clone(), value.clone());
        }
    }
    JsonValue::Object(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::EntityType;
    use serde_json::json;

    #[test]
    fn base_attributes_carry_identity_and_enrichment() {
        let mut candidate = EntityCandidate::new(EntityType::Coverage, "General Liability");
        candidate
            .attributes
            .insert("description".into(), json!("Covers bodily injury"));

        let attrs = build_base_attributes(&candidate);
        assert_eq!(attrs["normalized_value"], "General Liability");
        assert_eq!(attrs["id"], candidate.entity_id);
        assert_eq!(attrs["description"], "Covers bodily injury");
    }

    #[test]
    fn base_attributes_do_not_let_enrichment_shadow_identity() {
        let mut candidate = EntityCandidate::new(EntityType::Policy, "POL-1");
        candidate
            .attributes
            .insert("normalized_value".into(), json!("SOMETHING-ELSE"));
        let attrs = build_base_attributes(&candidate);
        assert_eq!(attrs["normalized_value"], "POL-1");
    }
}
