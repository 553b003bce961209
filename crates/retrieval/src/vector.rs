//! Stage 2: vector-based retrieval.
//!
//! Embeds the expanded queries, runs the filtered multi-query search,
//! reranks with intent-aware boosts, then resolves result content by
//! re-deriving the indexed text from `SectionExtraction` fields through the
//! same templates the indexer used.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use domain::{PageRange, SectionExtraction, VectorEmbedding};
use semantic::EmbeddingModel;
use store::{
    DocumentRepository, SearchFilters, SectionExtractionRepository, VectorEmbeddingRepository,
};

use crate::plan::QueryPlan;
use crate::rerank::IntentReranker;
use crate::RetrievalError;

/// Default result budget for one retrieval pass.
pub const DEFAULT_VECTOR_TOP_K: usize = 15;

/// Default cosine distance ceiling.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.7;

/// One fully resolved vector search result.
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub embedding_id: Uuid,
    pub document_id: Uuid,
    pub entity_id: String,
    pub content: String,
    pub section_type: String,
    pub entity_type: String,
    pub similarity_score: f64,
    pub final_score: f64,
    pub document_name: String,
    pub page_numbers: Vec<i32>,
    pub page_range: Option<PageRange>,
    pub effective_date: Option<NaiveDate>,
}

pub struct VectorRetrievalService {
    embedding_repo: VectorEmbeddingRepository,
    extraction_repo: SectionExtractionRepository,
    document_repo: DocumentRepository,
    embedder: Arc<dyn EmbeddingModel>,
    reranker: IntentReranker,
}

impl VectorRetrievalService {
    pub fn new(
        embedding_repo: VectorEmbeddingRepository,
        extraction_repo: SectionExtractionRepository,
        document_repo: DocumentRepository,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            embedding_repo,
            extraction_repo,
            document_repo,
            embedder,
            reranker: IntentReranker,
        }
    }

    pub async fn retrieve(
        &self,
        query_plan: &QueryPlan,
        workflow_id: Uuid,
        top_k: usize,
        max_distance: f64,
    ) -> Result<Vec<VectorSearchResult>, RetrievalError> {
        if query_plan.expanded_queries.is_empty() {
            warn!("no expanded queries to embed");
            return Ok(Vec::new());
        }

        let query_embeddings = self
            .embedder
            .encode_batch(&query_plan.expanded_queries)
            .await?;

        let filters = SearchFilters {
            workflow_id: Some(workflow_id),
            document_ids: query_plan.target_document_ids.clone(),
            section_types: (!query_plan.section_type_filters.is_empty())
                .then(|| query_plan.section_type_filters.clone()),
            entity_types: (!query_plan.entity_type_filters.is_empty())
                .then(|| query_plan.entity_type_filters.clone()),
            page_range: None,
        };

        let raw_results = self
            .embedding_repo
            .semantic_search_multi_query(&query_embeddings, top_k, &filters, Some(max_distance))
            .await?;
        if raw_results.is_empty() {
            info!(%workflow_id, "no vector results found");
            return Ok(Vec::new());
        }
        info!(
            count = raw_results.len(),
            best_distance = raw_results.first().map(|r| r.distance).unwrap_or(0.0),
            "raw vector results"
        );

        let reranked = self.reranker.rerank(
            raw_results,
            query_plan.intent,
            &query_plan.extracted_entities,
            &query_plan.entity_type_filters,
        );

        let results = self.resolve_results(reranked, workflow_id).await?;
        info!(
            intent = query_plan.intent.as_str(),
            final_count = results.len(),
            top_score = results.first().map(|r| r.final_score).unwrap_or(0.0),
            "vector retrieval complete"
        );
        Ok(results)
    }

    async fn resolve_results(
        &self,
        reranked: Vec<crate::rerank::RerankedResult>,
        workflow_id: Uuid,
    ) -> Result<Vec<VectorSearchResult>, RetrievalError> {
        if reranked.is_empty() {
            return Ok(Vec::new());
        }

        let doc_ids: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = reranked.iter().map(|r| r.hit.embedding.document_id).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let doc_names: HashMap<Uuid, String> = self
            .document_repo
            .file_names(&doc_ids)
            .await?
            .into_iter()
            .collect();

        // Bulk-fetch section extractions per (document, section).
        let mut content_map: HashMap<(Uuid, String), Vec<SectionExtraction>> = HashMap::new();
        for result in &reranked {
            let key = (
                result.hit.embedding.document_id,
                result.hit.embedding.section_type.clone(),
            );
            if content_map.contains_key(&key) {
                continue;
            }
            let extractions = self
                .extraction_repo
                .get_by_document_and_section(key.0, &key.1, Some(workflow_id))
                .await?;
            content_map.insert(key, extractions);
        }

        let mut results = Vec::with_capacity(reranked.len());
        for r in reranked {
            let embedding = &r.hit.embedding;
            let extractions = content_map
                .get(&(embedding.document_id, embedding.section_type.clone()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let content = resolve_entity_content(embedding, extractions);
            let (page_numbers, page_range) = extract_page_info(extractions);
            let document_name = doc_names
                .get(&embedding.document_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());

            results.push(VectorSearchResult {
                embedding_id: embedding.id,
                document_id: embedding.document_id,
                entity_id: embedding.entity_id.clone(),
                content,
                section_type: embedding.section_type.clone(),
                entity_type: embedding.entity_type.clone(),
                similarity_score: r.similarity,
                final_score: r.final_score,
                document_name,
                page_numbers,
                page_range,
                effective_date: embedding.effective_date,
            });
        }
        Ok(results)
    }
}

/// Re-derive an embedding's text on the fly from section extraction fields,
/// using the same templates the indexer rendered with.
pub fn resolve_entity_content(
    embedding: &VectorEmbedding,
    extractions: &[SectionExtraction],
) -> String {
    if extractions.is_empty() {
        return format!(
            "[{}] {} (content unavailable)",
            embedding.section_type,
            if embedding.entity_type.is_empty() {
                "entity"
            } else {
                &embedding.entity_type
            }
        );
    }

    // entity_id format: "{section_type}_{suffix}"; the suffix encodes the
    // position within the section's list (e.g. "cov_0").
    let prefix = format!("{}_", embedding.section_type);
    let suffix = embedding
        .entity_id
        .strip_prefix(&prefix)
        .unwrap_or(&embedding.entity_id);

    for extraction in extractions {
        let entities = indexing::section_entities(&extraction.section_type, &extraction.extracted_fields);
        if let Some(entity) = entities.iter().find(|e| e.suffix == suffix) {
            let text = indexing::render(&extraction.section_type, &entity.data);
            if text.trim().len() >= 10 {
                return text;
            }
        }
    }

    // Last resort: summarize the first extraction's scalar fields.
    format_section_summary(&extractions[0], embedding)
}

fn format_section_summary(extraction: &SectionExtraction, embedding: &VectorEmbedding) -> String {
    let mut parts = vec![format!("[{}]", embedding.section_type)];
    if let Some(fields) = extraction.extracted_fields.as_object() {
        for (key, value) in fields.iter().take(5) {
            match value {
                JsonValue::Array(items) => parts.push(format!("{key}: {} items", items.len())),
                JsonValue::Object(_) | JsonValue::Null => continue,
                other => parts.push(format!("{key}: {other}")),
            }
        }
    }
    if parts.len() > 1 {
        parts.join(" | ")
    } else {
        format!("[{}] (summary)", embedding.section_type)
    }
}

fn extract_page_info(extractions: &[SectionExtraction]) -> (Vec<i32>, Option<PageRange>) {
    for extraction in extractions {
        let range = extraction.page_range;
        if range.end >= range.start && range.start >= 1 {
            return ((range.start..=range.end).collect(), Some(range));
        }
    }
    (Vec::new(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::SourceChunks;
    use serde_json::json;

    fn embedding(section: &str, entity_id: &str) -> VectorEmbedding {
        VectorEmbedding {
            id: Uuid::new_v4(),
            document_id: Uuid::nil(),
            workflow_id: None,
            source_chunk_id: None,
            section_type: section.to_string(),
            entity_type: "coverage".to_string(),
            entity_id: entity_id.to_string(),
            embedding_model: "all-MiniLM-L6-v2".into(),
            embedding_dim: 384,
            embedding_version: "v1".into(),
            embedding: pgvector::Vector::from(vec![0.0f32; 4]),
            content_hash: "h".into(),
            effective_date: None,
            expiration_date: None,
            location_id: None,
            embedded_at: None,
            created_at: Utc::now(),
        }
    }

    fn extraction(section: &str, fields: JsonValue) -> SectionExtraction {
        SectionExtraction {
            id: Uuid::new_v4(),
            document_id: Uuid::nil(),
            workflow_id: Uuid::nil(),
            pipeline_run_id: None,
            section_type: section.to_string(),
            extracted_fields: fields,
            page_range: PageRange { start: 2, end: 3 },
            confidence: 0.9,
            source_chunks: SourceChunks::default(),
            model_version: None,
            prompt_version: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn content_re_derives_through_templates() {
        let ext = extraction(
            "coverages",
            json!({"coverages": [
                {"coverage_name": "Building", "limit_amount": 100},
                {"coverage_name": "Business Income", "limit_amount": 200},
            ]}),
        );
        let emb = embedding("coverages", "coverages_cov_1");
        let content = resolve_entity_content(&emb, &[ext]);
        assert!(content.contains("Coverage Name: Business Income"));
        // Rendered through the shared template, so the keyword line is there.
        assert!(content.contains("Context keywords:"));
    }

    #[test]
    fn missing_extraction_yields_placeholder() {
        let emb = embedding("coverages", "coverages_cov_0");
        let content = resolve_entity_content(&emb, &[]);
        assert!(content.contains("content unavailable"));
    }

    #[test]
    fn page_info_expands_range() {
        let ext = extraction("declarations", json!({}));
        let (pages, range) = extract_page_info(&[ext]);
        assert_eq!(pages, vec![2, 3]);
        assert_eq!(range, Some(PageRange { start: 2, end: 3 }));
    }
}
