//! Default stage logic wired over the service crates.
//!
//! The orchestrator owns ordering, retries, and timeouts; this runner owns
//! what each stage actually does. The processed and classified stages verify
//! the outputs of the external OCR and classification collaborators; the
//! extracted, enriched, and summarized stages run the core pipeline.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use cite::{CitationMapper, CitationRequest};
use domain::{DocumentStatus, PageRange, PipelineStage, SourceChunks};
use enrich::{EntityAggregator, EntityResolver, RelationshipExtractor};
use extract::{SectionBatchExtractor, SectionChunkInput};
use graph::GraphProjector;
use indexing::{ChunkEmbeddingService, GenerateEmbeddingsService};
use store::{DocumentChunkRepository, DocumentPageRepository, DocumentRepository};
use workflow::{StageError, StageRunner};

pub struct DefaultStageRunner {
    pub document_repo: DocumentRepository,
    pub page_repo: DocumentPageRepository,
    pub chunk_repo: DocumentChunkRepository,
    pub extractor: SectionBatchExtractor,
    pub aggregator: EntityAggregator,
    pub resolver: EntityResolver,
    pub relationship_extractor: RelationshipExtractor,
    pub embeddings: GenerateEmbeddingsService,
    pub chunk_embeddings: ChunkEmbeddingService,
    pub projector: Option<GraphProjector>,
    pub citation_mapper: CitationMapper,
    pub relationship_repo: store::EntityRelationshipRepository,
    pub canonical_repo: store::CanonicalEntityRepository,
}

#[async_trait]
impl StageRunner for DefaultStageRunner {
    async fn run_stage(
        &self,
        stage: PipelineStage,
        workflow_id: Uuid,
        document_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<JsonValue>, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        match stage {
            PipelineStage::Processed => self.run_processed(document_id).await,
            PipelineStage::Classified => self.run_classified(document_id).await,
            PipelineStage::Extracted => self.run_extracted(workflow_id, document_id, cancel).await,
            PipelineStage::Enriched => self.run_enriched(workflow_id, document_id, cancel).await,
            PipelineStage::Summarized => self.run_summarized(workflow_id, document_id, cancel).await,
        }
    }
}

impl DefaultStageRunner {
    /// OCR runs externally; this stage verifies its artifacts landed.
    async fn run_processed(&self, document_id: Uuid) -> Result<Option<JsonValue>, StageError> {
        let pages = self.page_repo.get_all(document_id).await?;
        if pages.is_empty() {
            return Err(StageError::Failed(format!(
                "no OCR page output for document {document_id}"
            )));
        }
        self.document_repo
            .update_status(document_id, DocumentStatus::OcrProcessed)
            .await?;
        Ok(Some(json!({"pages": pages.len()})))
    }

    /// Classification runs externally; this stage verifies chunking carried
    /// section labels.
    async fn run_classified(&self, document_id: Uuid) -> Result<Option<JsonValue>, StageError> {
        let chunks = self.chunk_repo.get_by_document(document_id).await?;
        if chunks.is_empty() {
            return Err(StageError::Failed(format!(
                "no chunks for document {document_id}"
            )));
        }
        let sectioned = chunks.iter().filter(|c| c.section().is_some()).count();
        self.document_repo
            .update_status(document_id, DocumentStatus::Classified)
            .await?;
        Ok(Some(json!({
            "chunks": chunks.len(),
            "sectioned_chunks": sectioned,
        })))
    }

    async fn run_extracted(
        &self,
        workflow_id: Uuid,
        document_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<JsonValue>, StageError> {
        let chunks = self.chunk_repo.get_by_document(document_id).await?;
        if chunks.is_empty() {
            return Err(StageError::Failed(format!(
                "no chunks for document {document_id}"
            )));
        }

        // Group chunks into one extraction input per section.
        let mut by_section: BTreeMap<String, SectionChunkInput> = BTreeMap::new();
        for chunk in &chunks {
            let section = chunk.section().unwrap_or("unknown").to_lowercase();
            let input = by_section
                .entry(section.clone())
                .or_insert_with(|| SectionChunkInput {
                    section_type: section,
                    texts: Vec::new(),
                    page_range: PageRange::single(chunk.page_number),
                    source_chunks: SourceChunks::default(),
                });
            input.texts.push(chunk.raw_text.clone());
            input.page_range.start = input.page_range.start.min(chunk.page_number);
            input.page_range.end = input.page_range.end.max(chunk.page_number);
            input.source_chunks.chunk_ids.push(chunk.id);
            input
                .source_chunks
                .stable_chunk_ids
                .push(chunk.stable_chunk_id.clone());
        }
        let inputs: Vec<SectionChunkInput> = by_section.into_values().collect();

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let rows = self
            .extractor
            .extract_document(document_id, workflow_id, &inputs, None)
            .await
            .map_err(extract_stage_error)?;

        self.document_repo
            .update_status(document_id, DocumentStatus::Extracted)
            .await?;
        Ok(Some(json!({
            "sections": inputs.len(),
            "extractions": rows.len(),
        })))
    }

    async fn run_enriched(
        &self,
        workflow_id: Uuid,
        document_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<JsonValue>, StageError> {
        let aggregated = self
            .aggregator
            .aggregate_entities(document_id, workflow_id, None)
            .await
            .map_err(enrich_stage_error)?;

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let canonical_ids = self
            .resolver
            .resolve_entities_batch(&aggregated.entities, None, document_id, Some(workflow_id))
            .await
            .map_err(enrich_stage_error)?;

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let document_type = self
            .document_repo
            .latest_classification(document_id)
            .await?
            .unwrap_or_else(|| "policy".to_string());
        let relationships = self
            .relationship_extractor
            .extract_relationships(document_id, Some(workflow_id), &document_type)
            .await
            .map_err(enrich_stage_error)?;

        info!(
            %document_id,
            entities = canonical_ids.len(),
            relationships = relationships.len(),
            filtered = aggregated.filter_stats.total_filtered,
            "enrichment stage complete"
        );
        Ok(Some(json!({
            "unique_entities": aggregated.unique_entities,
            "resolved_entities": canonical_ids.len(),
            "relationships": relationships.len(),
            "filter_stats": {
                "total_filtered": aggregated.filter_stats.total_filtered,
                "low_confidence": aggregated.filter_stats.low_confidence,
                "generic_names": aggregated.filter_stats.generic_names,
                "section_references": aggregated.filter_stats.section_references,
                "short_names": aggregated.filter_stats.short_names,
            },
        })))
    }

    async fn run_summarized(
        &self,
        workflow_id: Uuid,
        document_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<JsonValue>, StageError> {
        let entity_stats = self
            .embeddings
            .run(document_id, workflow_id)
            .await
            .map_err(indexing_stage_error)?;

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let chunk_stats = self
            .chunk_embeddings
            .generate_chunk_embeddings(document_id, workflow_id)
            .await
            .map_err(indexing_stage_error)?;

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let graph_stats = match &self.projector {
            Some(projector) => Some(
                projector
                    .project_workflow(workflow_id)
                    .await
                    .map_err(graph_stage_error)?,
            ),
            None => {
                warn!(%workflow_id, "graph store not configured, skipping projection");
                None
            }
        };

        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let citations = self.map_citations(document_id).await?;

        Ok(Some(json!({
            "entity_embeddings": entity_stats.embeddings_created,
            "chunk_embeddings": chunk_stats.chunks_embedded,
            "graph_entities": graph_stats.map(|s| s.entities_created),
            "graph_relationships": graph_stats.map(|s| s.relationships_created),
            "citations": citations,
        })))
    }

    /// Citation creation for the document's relationship evidence quotes and
    /// entity source texts.
    async fn map_citations(&self, document_id: Uuid) -> Result<usize, StageError> {
        let mut created = 0usize;

        for relationship in self.relationship_repo.get_by_document(document_id).await? {
            for evidence in relationship.evidence() {
                let Some(quote) = evidence.get("quote").and_then(JsonValue::as_str) else {
                    continue;
                };
                if quote.trim().is_empty() {
                    continue;
                }
                let request = CitationRequest {
                    document_id,
                    source_type: "relationship".to_string(),
                    source_id: relationship.id.to_string(),
                    verbatim_text: quote.to_string(),
                    page_range: None,
                    clause_reference: None,
                };
                match self.citation_mapper.map_citation(&request).await {
                    Ok(Some(_)) => created += 1,
                    Ok(None) => {}
                    Err(err) => warn!(
                        relationship_id = %relationship.id,
                        error = %err,
                        "failed to map relationship citation"
                    ),
                }
                // One evidence quote per relationship is enough for the
                // citation row; the rest stay in attributes.
                break;
            }
        }

        for entity in self.canonical_repo.get_by_document(document_id).await? {
            let Some(source_text) = entity.attribute_str("source_text") else {
                continue;
            };
            if source_text.trim().is_empty() {
                continue;
            }
            let request = CitationRequest {
                document_id,
                source_type: "entity".to_string(),
                source_id: entity.canonical_key.clone(),
                verbatim_text: source_text.to_string(),
                page_range: None,
                clause_reference: None,
            };
            match self.citation_mapper.map_citation(&request).await {
                Ok(Some(_)) => created += 1,
                Ok(None) => {}
                Err(err) => warn!(
                    canonical_key = %entity.canonical_key,
                    error = %err,
                    "failed to map entity citation"
                ),
            }
        }

        Ok(created)
    }
}

fn extract_stage_error(err: extract::ExtractError) -> StageError {
    match err {
        extract::ExtractError::Llm(inner) => inner.into(),
        extract::ExtractError::Store(inner) => inner.into(),
        extract::ExtractError::EmptyInput => StageError::Failed(err.to_string()),
    }
}

fn enrich_stage_error(err: enrich::EnrichError) -> StageError {
    match err {
        enrich::EnrichError::Llm(inner) => inner.into(),
        enrich::EnrichError::Store(inner) => inner.into(),
        enrich::EnrichError::InvalidCandidate(message) => StageError::Failed(message),
    }
}

fn indexing_stage_error(err: indexing::IndexingError) -> StageError {
    match err {
        indexing::IndexingError::Store(inner) => inner.into(),
        indexing::IndexingError::Semantic(inner) => StageError::Transient(inner.to_string()),
    }
}

fn graph_stage_error(err: graph::GraphError) -> StageError {
    match err {
        graph::GraphError::Store(inner) => inner.into(),
        graph::GraphError::Connection(message) => StageError::Transient(message),
        other => StageError::Failed(other.to_string()),
    }
}
