//! Chunk-level embedding generation.
//!
//! Embeds every document chunk with the shared model using a contextualized
//! text (section header + page + raw text). These vectors power Tier-2
//! citation mapping and keyword-free retrieval.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use domain::{DocumentChunk, SyncStatus, EMBEDDING_VERSION};
use semantic::EmbeddingModel;
use store::{
    DocumentChunkRepository, EmbeddingSyncStateRepository, NewEmbedding,
    VectorEmbeddingRepository,
};

use crate::IndexingError;

const MIN_TEXT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkEmbeddingStats {
    pub chunks_embedded: usize,
    pub total_chunks: usize,
}

pub struct ChunkEmbeddingService {
    chunk_repo: DocumentChunkRepository,
    embedding_repo: VectorEmbeddingRepository,
    sync_repo: EmbeddingSyncStateRepository,
    embedder: Arc<dyn EmbeddingModel>,
}

impl ChunkEmbeddingService {
    pub fn new(
        chunk_repo: DocumentChunkRepository,
        embedding_repo: VectorEmbeddingRepository,
        sync_repo: EmbeddingSyncStateRepository,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            chunk_repo,
            embedding_repo,
            sync_repo,
            embedder,
        }
    }

    /// Embed all chunks of a document in one batch call, replacing any
    /// previous chunk embeddings, and record per-chunk sync state.
    pub async fn generate_chunk_embeddings(
        &self,
        document_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<ChunkEmbeddingStats, IndexingError> {
        let deleted = self.embedding_repo.delete_chunk_embeddings(document_id).await?;
        if deleted > 0 {
            info!(%document_id, deleted, "deleted existing chunk embeddings");
        }

        let chunks = self.chunk_repo.get_by_document(document_id).await?;
        if chunks.is_empty() {
            info!(%document_id, "no chunks found for embedding generation");
            return Ok(ChunkEmbeddingStats::default());
        }
        let total_chunks = chunks.len();

        let mut texts = Vec::new();
        let mut valid_chunks = Vec::new();
        for chunk in &chunks {
            let text = contextualized_text(chunk);
            if text.trim().len() >= MIN_TEXT_LEN {
                texts.push(text);
                valid_chunks.push(chunk);
            }
        }
        if texts.is_empty() {
            return Ok(ChunkEmbeddingStats { chunks_embedded: 0, total_chunks });
        }

        info!(%document_id, count = texts.len(), "batch encoding chunk texts");
        let vectors = self.embedder.encode_batch(&texts).await?;

        let mut embedded = 0usize;
        for ((chunk, text), vector) in valid_chunks.iter().zip(&texts).zip(vectors) {
            let content_hash = hex::encode(Sha256::digest(text.as_bytes()));
            let section_type = chunk.section().unwrap_or("unknown").to_string();
            let dimension = vector.len() as i32;
            let result = self
                .embedding_repo
                .create(NewEmbedding {
                    document_id,
                    workflow_id: Some(workflow_id),
                    source_chunk_id: Some(chunk.id),
                    section_type,
                    entity_type: "chunk".to_string(),
                    entity_id: chunk.stable_chunk_id.clone(),
                    embedding_model: self.embedder.model_name().to_string(),
                    embedding_version: EMBEDDING_VERSION.to_string(),
                    embedding: vector,
                    content_hash,
                    effective_date: None,
                    expiration_date: None,
                    location_id: None,
                })
                .await;

            match result {
                Ok(_) => {
                    embedded += 1;
                    self.sync_repo
                        .upsert(
                            &chunk.stable_chunk_id,
                            self.embedder.model_name(),
                            EMBEDDING_VERSION,
                            dimension,
                            SyncStatus::Synced,
                            None,
                        )
                        .await?;
                }
                Err(err) => {
                    warn!(
                        stable_chunk_id = %chunk.stable_chunk_id,
                        error = %err,
                        "failed to embed chunk"
                    );
                    if matches!(err, store::StoreError::Fatal(_)) {
                        return Err(err.into());
                    }
                    self.sync_repo
                        .upsert(
                            &chunk.stable_chunk_id,
                            self.embedder.model_name(),
                            EMBEDDING_VERSION,
                            dimension,
                            SyncStatus::Failed,
                            Some(&err.to_string()),
                        )
                        .await?;
                }
            }
        }

        info!(
            %document_id,
            chunks_embedded = embedded,
            total_chunks,
            "chunk embedding generation complete"
        );
        Ok(ChunkEmbeddingStats { chunks_embedded: embedded, total_chunks })
    }
}

/// Context-enriched text for one chunk: section title and page before the
/// raw text.
pub fn contextualized_text(chunk: &DocumentChunk) -> String {
    match chunk.section() {
        Some(section) => {
            let title = section
                .split('_')
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            format!("{title} (Page {})\n\n{}", chunk.page_number, chunk.raw_text)
        }
        None => chunk.raw_text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(section: Option<&str>, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::new_v4(),
            document_id: Uuid::nil(),
            stable_chunk_id: "doc_x_p3_c0".into(),
            page_number: 3,
            chunk_index: 0,
            section_type: section.map(str::to_string),
            effective_section_type: None,
            subsection_type: None,
            raw_text: text.to_string(),
            token_count: 12,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn contextualized_text_prepends_section_and_page() {
        let text = contextualized_text(&chunk(Some("loss_run"), "Claim CLM-1 incurred $500"));
        assert!(text.starts_with("Loss Run (Page 3)\n\n"));
        assert!(text.ends_with("Claim CLM-1 incurred $500"));
    }

    #[test]
    fn chunks_without_sections_embed_raw_text() {
        let text = contextualized_text(&chunk(None, "Plain text"));
        assert_eq!(text, "Plain text");
    }
}
