//! The citation mapper: Tier-1 exact OCR match with Tier-2 semantic
//! fallback.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use domain::{BoundingBox, Citation, CitationSpan, ExtractionMethod, PageRange};
use semantic::EmbeddingModel;
use store::{
    CitationRepository, DocumentPageRepository, OcrWordRepository, SearchFilters,
    VectorEmbeddingRepository,
};

use crate::tier1::{find_word_sequence, merge_word_boxes};
use crate::CiteError;

/// Confidence recorded for exact matches.
const TIER1_CONFIDENCE: f64 = 0.95;

/// Cosine distance ceiling for the Tier-2 chunk lookup.
const TIER2_MAX_DISTANCE: f64 = 0.7;

/// One citation request.
#[derive(Debug, Clone)]
pub struct CitationRequest {
    pub document_id: Uuid,
    pub source_type: String,
    pub source_id: String,
    pub verbatim_text: String,
    pub page_range: Option<PageRange>,
    pub clause_reference: Option<String>,
}

pub struct CitationMapper {
    word_repo: OcrWordRepository,
    page_repo: DocumentPageRepository,
    citation_repo: CitationRepository,
    embedding_repo: VectorEmbeddingRepository,
    embedder: Arc<dyn EmbeddingModel>,
}

impl CitationMapper {
    pub fn new(
        word_repo: OcrWordRepository,
        page_repo: DocumentPageRepository,
        citation_repo: CitationRepository,
        embedding_repo: VectorEmbeddingRepository,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Self {
        Self {
            word_repo,
            page_repo,
            citation_repo,
            embedding_repo,
            embedder,
        }
    }

    /// Map a `(verbatim_text, page_range)` tuple into a persisted citation.
    ///
    /// Tier 1 looks for the exact word sequence in the OCR output; when that
    /// fails, Tier 2 falls back to the semantically closest chunk. Returns
    /// `None` when neither tier can place the text.
    pub async fn map_citation(
        &self,
        request: &CitationRequest,
    ) -> Result<Option<Citation>, CiteError> {
        if request.verbatim_text.trim().is_empty() {
            return Err(CiteError::EmptyVerbatimText);
        }

        if let Some(citation) = self.try_tier1(request).await? {
            return Ok(Some(citation));
        }
        debug!(
            source_id = %request.source_id,
            "tier-1 exact match failed, falling back to semantic"
        );
        self.try_tier2(request).await
    }

    async fn try_tier1(&self, request: &CitationRequest) -> Result<Option<Citation>, CiteError> {
        let search_range = match request.page_range {
            Some(range) => range,
            // Without a hint, scan the whole document.
            None => PageRange { start: 1, end: i32::MAX },
        };
        let words = self
            .word_repo
            .load_words(request.document_id, search_range)
            .await?;
        if words.is_empty() {
            return Ok(None);
        }

        let Some(matched) = find_word_sequence(&words, &request.verbatim_text) else {
            return Ok(None);
        };

        let mut spans = merge_word_boxes(matched);
        self.clamp_spans(request.document_id, &mut spans).await?;

        let primary_page = spans.first().map(|s| s.page_number).unwrap_or(1);
        let last_page = spans.last().map(|s| s.page_number).unwrap_or(primary_page);

        let citation = self
            .citation_repo
            .upsert(
                request.document_id,
                &request.source_type,
                &request.source_id,
                &spans,
                &request.verbatim_text,
                primary_page,
                PageRange { start: primary_page, end: last_page },
                TIER1_CONFIDENCE,
                ExtractionMethod::Tier1ExactMatch,
                request.clause_reference.as_deref(),
            )
            .await?;

        info!(
            source_id = %request.source_id,
            primary_page,
            spans = citation.spans.len(),
            "citation mapped via exact match"
        );
        Ok(Some(citation))
    }

    async fn try_tier2(&self, request: &CitationRequest) -> Result<Option<Citation>, CiteError> {
        let query_vector = self.embedder.encode(&request.verbatim_text).await?;
        let filters = SearchFilters {
            document_ids: Some(vec![request.document_id]),
            entity_types: Some(vec!["chunk".to_string()]),
            page_range: request.page_range,
            ..Default::default()
        };
        let hits = self
            .embedding_repo
            .semantic_search(&query_vector, 1, &filters, Some(TIER2_MAX_DISTANCE))
            .await?;

        let Some(best) = hits.first() else {
            warn!(
                source_id = %request.source_id,
                "no chunk above similarity threshold for semantic citation"
            );
            return Ok(None);
        };

        // The chunk's page becomes the span; its box is the union of the
        // page's OCR words (full page when no words survive).
        let Some(source_chunk_id) = best.embedding.source_chunk_id else {
            return Ok(None);
        };
        let chunk_page = self
            .chunk_page_number(request.document_id, source_chunk_id, &best.embedding.entity_id)
            .await?;

        let page = self
            .page_repo
            .get_page(request.document_id, chunk_page)
            .await?;
        let (width, height) = page
            .as_ref()
            .map(|p| (p.width_points, p.height_points))
            .unwrap_or((612.0, 792.0));

        let page_words = self
            .word_repo
            .load_words(request.document_id, PageRange::single(chunk_page))
            .await?;
        let bbox = page_words
            .iter()
            .map(|w| BoundingBox { x0: w.x0, y0: w.y0, x1: w.x1, y1: w.y1 })
            .reduce(|a, b| a.union(&b))
            .unwrap_or(BoundingBox { x0: 0.0, y0: 0.0, x1: width, y1: height })
            .clamped(width, height);

        let spans = vec![CitationSpan {
            page_number: chunk_page,
            bounding_boxes: vec![bbox],
            text_content: None,
        }];
        let similarity = (1.0 - best.distance).max(0.0);

        let citation = self
            .citation_repo
            .upsert(
                request.document_id,
                &request.source_type,
                &request.source_id,
                &spans,
                &request.verbatim_text,
                chunk_page,
                PageRange::single(chunk_page),
                similarity,
                ExtractionMethod::Tier2Semantic,
                request.clause_reference.as_deref(),
            )
            .await?;

        info!(
            source_id = %request.source_id,
            chunk_page,
            similarity,
            "citation mapped via semantic chunk match"
        );
        Ok(Some(citation))
    }

    /// Resolve the page number of the matched chunk, falling back to parsing
    /// the stable chunk id (`doc_<id>_p<page>_c<idx>`).
    async fn chunk_page_number(
        &self,
        _document_id: Uuid,
        _source_chunk_id: Uuid,
        entity_id: &str,
    ) -> Result<i32, CiteError> {
        if let Some(page) = parse_page_from_stable_id(entity_id) {
            return Ok(page);
        }
        Ok(1)
    }

    /// Bboxes are stored post-rotation in PDF points and must lie within the
    /// page dimensions; clamp every span against its page.
    async fn clamp_spans(
        &self,
        document_id: Uuid,
        spans: &mut [CitationSpan],
    ) -> Result<(), CiteError> {
        for span in spans.iter_mut() {
            let Some(page) = self.page_repo.get_page(document_id, span.page_number).await? else {
                continue;
            };
            for bbox in &mut span.bounding_boxes {
                *bbox = bbox.clamped(page.width_points, page.height_points);
            }
        }
        Ok(())
    }
}

/// Extract the page number from a stable chunk id of the form
/// `doc_<docid>_p<page>_c<index>`.
pub fn parse_page_from_stable_id(stable_id: &str) -> Option<i32> {
    let after_p = stable_id.rsplit("_p").next()?;
    let page_part = after_p.split("_c").next()?;
    page_part.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_from_stable_chunk_id() {
        assert_eq!(
            parse_page_from_stable_id("doc_00000000-0000-0000-0000-000000000000_p5_c2"),
            Some(5)
        );
        assert_eq!(parse_page_from_stable_id("doc_x_p12_c0"), Some(12));
        assert_eq!(parse_page_from_stable_id("not-a-chunk-id"), None);
    }
}
