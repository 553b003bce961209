//! Stage 5: response generation and citation attachment.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use llm::{parse_json_safely, GenerationConfig, LlmClient};
use store::CitationRepository;

use crate::context::{format_context_markdown, ContextPayload};
use crate::{RetrievalError, RESPONSE_GENERATION_PROMPT};

/// One citation attached to the answer.
#[derive(Debug, Clone)]
pub struct SourceCitation {
    pub document_id: Uuid,
    pub source_id: String,
    pub page_number: i32,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedResponse {
    pub answer: String,
    pub cited_source_ids: Vec<String>,
}

pub struct ResponseGenerationService {
    llm: Arc<dyn LlmClient>,
    citation_repo: CitationRepository,
}

impl ResponseGenerationService {
    pub fn new(llm: Arc<dyn LlmClient>, citation_repo: CitationRepository) -> Self {
        Self { llm, citation_repo }
    }

    /// One LLM call with the Markdown context.
    pub async fn generate_response(
        &self,
        query: &str,
        context: &ContextPayload,
    ) -> Result<GeneratedResponse, RetrievalError> {
        let markdown = format_context_markdown(context);
        let user_message = format!("QUESTION: {query}\n\nCONTEXT:\n{markdown}");

        let raw = self
            .llm
            .generate_content(&user_message, RESPONSE_GENERATION_PROMPT, &GenerationConfig::default())
            .await?;

        match parse_json_safely(&raw) {
            Some(parsed) => {
                let answer = parsed
                    .get("answer")
                    .and_then(JsonValue::as_str)
                    .unwrap_or(raw.as_str())
                    .to_string();
                let cited_source_ids = parsed
                    .get("cited_source_ids")
                    .and_then(JsonValue::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(JsonValue::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(GeneratedResponse { answer, cited_source_ids })
            }
            None => {
                // A plain-text answer is still an answer.
                warn!("response payload was not JSON, using raw text");
                Ok(GeneratedResponse { answer: raw, cited_source_ids: Vec::new() })
            }
        }
    }

    /// Map result ids back to persisted `Citation` rows.
    pub async fn attach_citations(
        &self,
        context: &ContextPayload,
        cited_source_ids: &[String],
    ) -> Result<Vec<SourceCitation>, RetrievalError> {
        let cited: Vec<&crate::context::MergedResult> = context
            .full_text_results
            .iter()
            .chain(context.summary_results.iter())
            .filter(|r| cited_source_ids.is_empty() || cited_source_ids.contains(&r.source_id))
            .collect();

        let document_ids: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = cited.iter().filter_map(|r| r.document_id).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let source_ids: Vec<String> = cited.iter().map(|r| r.source_id.clone()).collect();
        if document_ids.is_empty() || source_ids.is_empty() {
            return Ok(Vec::new());
        }

        let citations = self
            .citation_repo
            .get_by_source_ids(&document_ids, &source_ids)
            .await?;

        Ok(citations
            .into_iter()
            .map(|citation| {
                let snippet: String = citation.verbatim_text.chars().take(160).collect();
                SourceCitation {
                    document_id: citation.document_id,
                    source_id: citation.source_id,
                    page_number: citation.primary_page,
                    snippet,
                }
            })
            .collect())
    }
}
