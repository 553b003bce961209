//! The section batch extractor service.

use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use domain::{PageRange, SectionExtraction, SourceChunks};
use llm::{parse_json_safely, GenerationConfig, LlmClient};
use store::SectionExtractionRepository;

use crate::schema::validate_section_items;
use crate::{ExtractError, SECTION_EXTRACTION_PROMPT, SECTION_PROMPT_VERSION};

/// Output token cap for extraction calls.
const MAX_OUTPUT_TOKENS: u32 = 32_000;

/// Input for one section: pre-grouped chunk texts plus provenance.
#[derive(Debug, Clone)]
pub struct SectionChunkInput {
    pub section_type: String,
    pub texts: Vec<String>,
    pub page_range: PageRange,
    pub source_chunks: SourceChunks,
}

/// Runs batched LLM extraction over sections and persists
/// `SectionExtraction` rows.
pub struct SectionBatchExtractor {
    llm: Arc<dyn LlmClient>,
    extraction_repo: SectionExtractionRepository,
    model_version: String,
}

impl SectionBatchExtractor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        extraction_repo: SectionExtractionRepository,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            extraction_repo,
            model_version: model_version.into(),
        }
    }

    /// Extract all section types in a single LLM call.
    ///
    /// JSON parse failure gets one repair retry; a second failure yields
    /// empty lists for every section so the stage can continue with partial
    /// results.
    pub async fn extract_all_sections(
        &self,
        sections: &BTreeMap<String, Vec<String>>,
        document_id: Uuid,
    ) -> Result<BTreeMap<String, Vec<JsonValue>>, ExtractError> {
        if sections.is_empty() {
            warn!(%document_id, "no sections provided for extraction");
            return Err(ExtractError::EmptyInput);
        }

        let user_message = json!({ "sections": sections }).to_string();
        let config = GenerationConfig::json_with_cap(MAX_OUTPUT_TOKENS);

        let raw = self
            .llm
            .generate_content(&user_message, SECTION_EXTRACTION_PROMPT, &config)
            .await?;

        let parsed = match parse_json_safely(&raw) {
            Some(value) => Some(value),
            None => {
                warn!(%document_id, "extraction payload unparseable, attempting repair");
                let repair_message = format!(
                    "{user_message}\n\nThe previous response was not valid JSON. \
                     Return ONLY the JSON object, with no surrounding text."
                );
                let raw = self
                    .llm
                    .generate_content(&repair_message, SECTION_EXTRACTION_PROMPT, &config)
                    .await?;
                parse_json_safely(&raw)
            }
        };

        let mut results: BTreeMap<String, Vec<JsonValue>> = sections
            .keys()
            .map(|section| (section.clone(), Vec::new()))
            .collect();

        let Some(parsed) = parsed else {
            warn!(%document_id, "extraction payload unparseable after repair, returning empty sections");
            return Ok(results);
        };

        for (section, items) in results.iter_mut() {
            if let Some(list) = parsed.get(section.as_str()).and_then(JsonValue::as_array) {
                *items = validate_section_items(section, list);
            }
        }

        info!(
            %document_id,
            sections = results.len(),
            items = results.values().map(Vec::len).sum::<usize>(),
            "section extraction complete"
        );
        Ok(results)
    }

    /// Extract and persist one row per input section.
    pub async fn extract_document(
        &self,
        document_id: Uuid,
        workflow_id: Uuid,
        inputs: &[SectionChunkInput],
        pipeline_run_id: Option<Uuid>,
    ) -> Result<Vec<SectionExtraction>, ExtractError> {
        let grouped: BTreeMap<String, Vec<String>> = inputs
            .iter()
            .map(|input| (input.section_type.clone(), input.texts.clone()))
            .collect();

        let extracted = self.extract_all_sections(&grouped, document_id).await?;

        let mut rows = Vec::with_capacity(inputs.len());
        for input in inputs {
            let items = extracted
                .get(&input.section_type)
                .cloned()
                .unwrap_or_default();
            let confidence = section_confidence(&items);

            let mut fields = Map::new();
            fields.insert(input.section_type.clone(), JsonValue::Array(items));

            let row = self
                .extraction_repo
                .create(
                    document_id,
                    workflow_id,
                    &input.section_type,
                    JsonValue::Object(fields),
                    input.page_range,
                    confidence,
                    &input.source_chunks,
                    Some(&self.model_version),
                    Some(SECTION_PROMPT_VERSION),
                    pipeline_run_id,
                )
                .await?;
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Mean item confidence, defaulting to 0.8 when items carry none.
fn section_confidence(items: &[JsonValue]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let sum: f64 = items
        .iter()
        .map(|i| i.get("confidence").and_then(JsonValue::as_f64).unwrap_or(0.8))
        .sum();
    sum / items.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::testing::ScriptedLlm;
    use serde_json::json;

    fn extractor_with(responses: Vec<String>) -> SectionBatchExtractor {
        // The repository half is only exercised through extract_document,
        // which the DB-free tests below avoid; a lazily-failing pool keeps
        // construction cheap.
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/docgraph_test")
            .expect("lazy pool");
        SectionBatchExtractor::new(
            Arc::new(ScriptedLlm::new(responses)),
            SectionExtractionRepository::new(pool),
            "test-model",
        )
    }

    #[tokio::test]
    async fn parses_multi_section_payload() {
        let payload = json!({
            "coverages": [{"coverage_name": "Building", "limit_amount": 1000}],
            "conditions": [{"title": "Notice of Loss"}],
            "exclusions": [],
        })
        .to_string();
        let extractor = extractor_with(vec![payload]);

        let mut sections = BTreeMap::new();
        sections.insert("coverages".to_string(), vec!["COVERAGE A".to_string()]);
        sections.insert("conditions".to_string(), vec!["DUTIES".to_string()]);
        sections.insert("exclusions".to_string(), vec!["WE DO NOT COVER".to_string()]);

        let result = extractor
            .extract_all_sections(&sections, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(result["coverages"].len(), 1);
        assert_eq!(result["coverages"][0]["coverage_name"], "Building");
        assert_eq!(result["conditions"].len(), 1);
        assert!(result["exclusions"].is_empty());
    }

    #[tokio::test]
    async fn repair_retry_recovers_fenced_garbage() {
        let good = json!({"coverages": [{"coverage_name": "GL"}]}).to_string();
        let extractor = extractor_with(vec!["not json at all".to_string(), good]);

        let mut sections = BTreeMap::new();
        sections.insert("coverages".to_string(), vec!["text".to_string()]);

        let result = extractor
            .extract_all_sections(&sections, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(result["coverages"][0]["coverage_name"], "GL");
    }

    #[tokio::test]
    async fn double_parse_failure_yields_empty_sections() {
        let extractor = extractor_with(vec!["garbage".to_string(), "more garbage".to_string()]);

        let mut sections = BTreeMap::new();
        sections.insert("coverages".to_string(), vec!["text".to_string()]);
        sections.insert("exclusions".to_string(), vec!["text".to_string()]);

        let result = extractor
            .extract_all_sections(&sections, Uuid::new_v4())
            .await
            .unwrap();
        assert!(result["coverages"].is_empty());
        assert!(result["exclusions"].is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_a_validation_error() {
        let extractor = extractor_with(vec![]);
        let sections = BTreeMap::new();
        let result = extractor
            .extract_all_sections(&sections, Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(ExtractError::EmptyInput)));
    }

    #[test]
    fn confidence_averages_item_confidences() {
        let items = vec![json!({"confidence": 0.9}), json!({"confidence": 0.7})];
        assert!((section_confidence(&items) - 0.8).abs() < 1e-9);
        assert_eq!(section_confidence(&[]), 0.0);
    }
}
