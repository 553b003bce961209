//! Entity-level embedding generation over section extractions.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use domain::EMBEDDING_VERSION;
use semantic::EmbeddingModel;
use store::{NewEmbedding, SectionExtractionRepository, VectorEmbeddingRepository};

use crate::processors::section_entities;
use crate::templates;
use crate::IndexingError;

/// Texts shorter than this after templating are not worth a vector.
const MIN_TEXT_LEN: usize = 10;

/// Outcome counters for one document run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingRunStats {
    pub embeddings_created: usize,
    pub entities_seen: usize,
    pub deleted_stale: u64,
}

pub struct GenerateEmbeddingsService {
    embedding_repo: VectorEmbeddingRepository,
    extraction_repo: SectionExtractionRepository,
    embedder: Arc<dyn EmbeddingModel>,
}

impl GenerateEmbeddingsService {
    pub fn new(
        embedding_repo: VectorEmbeddingRepository,
        extraction_repo: SectionExtractionRepository,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            embedding_repo,
            extraction_repo,
            embedder,
        }
    }

    /// Generate and store entity-level embeddings for every section of a
    /// document.
    ///
    /// Existing embeddings for the `(document, workflow)` pair are deleted
    /// first so reruns cannot leave stale vectors behind.
    pub async fn run(
        &self,
        document_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<EmbeddingRunStats, IndexingError> {
        let deleted = self
            .embedding_repo
            .delete_by_document_and_workflow(document_id, workflow_id)
            .await?;

        let sections = self.extraction_repo.get_by_document(document_id).await?;
        if sections.is_empty() {
            info!(%document_id, "no sections found for embedding generation");
            return Ok(EmbeddingRunStats { deleted_stale: deleted, ..Default::default() });
        }

        // Template everything up front so the whole document encodes in one
        // batch call.
        let mut pending: Vec<(String, String, String, String, JsonValue)> = Vec::new();
        for section in &sections {
            for entity in section_entities(&section.section_type, &section.extracted_fields) {
                let text = templates::render(&section.section_type, &entity.data);
                if text.trim().len() < MIN_TEXT_LEN {
                    continue;
                }
                let entity_id = format!("{}_{}", section.section_type, entity.suffix);
                pending.push((
                    section.section_type.clone(),
                    entity.entity_type,
                    entity_id,
                    text,
                    entity.data,
                ));
            }
        }

        let entities_seen = pending.len();
        if pending.is_empty() {
            return Ok(EmbeddingRunStats { deleted_stale: deleted, ..Default::default() });
        }

        let texts: Vec<String> = pending.iter().map(|(_, _, _, text, _)| text.clone()).collect();
        let vectors = self.embedder.encode_batch(&texts).await?;

        let mut created = 0usize;
        for ((section_type, entity_type, entity_id, text, data), vector) in
            pending.into_iter().zip(vectors)
        {
            let content_hash = hex::encode(Sha256::digest(text.as_bytes()));
            let metadata = extract_metadata(&data);
            let result = self
                .embedding_repo
                .create(NewEmbedding {
                    document_id,
                    workflow_id: Some(workflow_id),
                    source_chunk_id: None,
                    section_type,
                    entity_type,
                    entity_id,
                    embedding_model: self.embedder.model_name().to_string(),
                    embedding_version: EMBEDDING_VERSION.to_string(),
                    embedding: vector,
                    content_hash,
                    effective_date: metadata.effective_date,
                    expiration_date: metadata.expiration_date,
                    location_id: metadata.location_id,
                })
                .await;
            match result {
                Ok(_) => created += 1,
                Err(err) => {
                    error!(%document_id, error = %err, "failed to store entity embedding");
                    if matches!(err, store::StoreError::Fatal(_)) {
                        return Err(err.into());
                    }
                }
            }
        }

        info!(
            %document_id,
            %workflow_id,
            embeddings_created = created,
            entities_seen,
            "entity embedding generation complete"
        );
        Ok(EmbeddingRunStats {
            embeddings_created: created,
            entities_seen,
            deleted_stale: deleted,
        })
    }
}

struct EntityMetadata {
    effective_date: Option<NaiveDate>,
    expiration_date: Option<NaiveDate>,
    location_id: Option<String>,
}

fn extract_metadata(data: &JsonValue) -> EntityMetadata {
    EntityMetadata {
        effective_date: parse_date_field(data, "policy_period_start"),
        expiration_date: parse_date_field(data, "policy_period_end"),
        location_id: templates::get_field(data, "location_id").map(|v| match v {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        }),
    }
}

fn parse_date_field(data: &JsonValue, field: &str) -> Option<NaiveDate> {
    let value = templates::get_field(data, field)?;
    let raw = value.as_str()?;
    let date_part = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_parses_dates_and_location() {
        let data = json!({
            "policy_period_start": "2024-01-01T00:00:00",
            "policy_period_end": "2025-01-01",
            "location_id": 7,
        });
        let meta = extract_metadata(&data);
        assert_eq!(meta.effective_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(meta.expiration_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(meta.location_id.as_deref(), Some("7"));
    }

    #[test]
    fn metadata_tolerates_absence() {
        let meta = extract_metadata(&json!({"coverage_name": "GL"}));
        assert!(meta.effective_date.is_none());
        assert!(meta.location_id.is_none());
    }
}
