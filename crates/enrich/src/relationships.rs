//! Two-pass relationship extraction: semantic section batches, then a
//! cross-batch synthesis pass over everything the batches found.

use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use domain::{CanonicalEntity, EntityRelationship, RelationshipType};
use llm::{parse_json_safely, GenerationConfig, LlmClient};
use store::{
    CanonicalEntityRepository, DocumentChunkRepository, DocumentTableRepository,
    EntityMentionRepository, EntityRelationshipRepository, WorkflowScopeRepository,
};

use crate::batching::{partition_sections, BatchChunk, SemanticBatch};
use crate::candidate::EntityCandidate;
use crate::reconcile::{
    deduplicate_relationships, find_entity, temp_entity_id, RawRelationship, TempIndex,
};
use crate::resolver::EntityResolver;
use crate::{EnrichError, CROSS_BATCH_SYNTHESIS_PROMPT, RELATIONSHIP_EXTRACTION_PROMPT};

/// Per-chunk character cap inside batch prompts.
const CHUNK_TEXT_LIMIT: usize = 2000;

/// Output token cap for relationship calls.
const MAX_OUTPUT_TOKENS: u32 = 64_000;

/// Edges below this confidence are discarded.
const MIN_RELATIONSHIP_CONFIDENCE: f64 = 0.70;

/// Canonical entity count below which chunk-level candidates join the prompt.
const SPARSE_ENTITY_THRESHOLD: usize = 3;

/// Entities shown per type in the synthesis prompt.
const SYNTHESIS_ENTITIES_PER_TYPE: usize = 20;

/// Relationships sampled per batch in the synthesis prompt.
const SYNTHESIS_RELS_PER_BATCH: usize = 10;

pub struct RelationshipExtractor {
    llm: Arc<dyn LlmClient>,
    canonical_repo: CanonicalEntityRepository,
    mention_repo: EntityMentionRepository,
    chunk_repo: DocumentChunkRepository,
    table_repo: DocumentTableRepository,
    relationship_repo: EntityRelationshipRepository,
    scope_repo: WorkflowScopeRepository,
    resolver: EntityResolver,
}

impl RelationshipExtractor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        canonical_repo: CanonicalEntityRepository,
        mention_repo: EntityMentionRepository,
        chunk_repo: DocumentChunkRepository,
        table_repo: DocumentTableRepository,
        relationship_repo: EntityRelationshipRepository,
        scope_repo: WorkflowScopeRepository,
        resolver: EntityResolver,
    ) -> Self {
        Self {
            llm,
            canonical_repo,
            mention_repo,
            chunk_repo,
            table_repo,
            relationship_repo,
            scope_repo,
            resolver,
        }
    }

    /// Extract and persist relationships for one document.
    pub async fn extract_relationships(
        &self,
        document_id: Uuid,
        workflow_id: Option<Uuid>,
        document_type: &str,
    ) -> Result<Vec<EntityRelationship>, EnrichError> {
        info!(%document_id, "starting relationship extraction");

        let canonical_entities = self
            .fetch_canonical_entities(document_id, workflow_id)
            .await?;
        if canonical_entities.is_empty() {
            warn!(%document_id, "no canonical entities found for document");
            return Ok(Vec::new());
        }

        let chunks = self.chunk_repo.get_by_document(document_id).await?;
        if chunks.is_empty() {
            warn!(%document_id, "no document chunks found for document");
            return Ok(Vec::new());
        }

        // Sparse canonical inventory: add chunk-level candidates under temp
        // ids so the model still has endpoints to link.
        let is_sparse = canonical_entities.len() < SPARSE_ENTITY_THRESHOLD;
        let (temp_candidates, temp_index) = if is_sparse {
            warn!(
                %document_id,
                canonical_count = canonical_entities.len(),
                "sparse canonical entities, adding chunk-level candidates"
            );
            self.build_chunk_candidates(document_id).await?
        } else {
            (Vec::new(), TempIndex::new())
        };

        let sov_items = self.table_repo.get_sov_items(document_id).await?;
        let loss_run_claims = self.table_repo.get_loss_run_claims(document_id).await?;
        let document_tables = self.table_repo.get_by_document(document_id).await?;

        let sov_json = json!(sov_items
            .iter()
            .map(|sov| {
                json!({
                    "sov_id": format!("sov-{}", &sov.id.to_string()[..8]),
                    "location_number": sov.location_number,
                    "building_number": sov.building_number,
                    "description": sov.description,
                    "address": sov.address,
                    "construction_type": sov.construction_type,
                    "occupancy": sov.occupancy,
                    "year_built": sov.year_built,
                    "square_footage": sov.square_footage,
                    "building_limit": sov.building_limit,
                    "contents_limit": sov.contents_limit,
                    "bi_limit": sov.bi_limit,
                    "total_insured_value": sov.total_insured_value,
                })
            })
            .collect::<Vec<_>>());
        let claims_json = json!(loss_run_claims
            .iter()
            .map(|claim| {
                json!({
                    "claim_id": format!("claim-{}", &claim.id.to_string()[..8]),
                    "claim_number": claim.claim_number,
                    "policy_number": claim.policy_number,
                    "insured_name": claim.insured_name,
                    "loss_date": claim.loss_date,
                    "report_date": claim.report_date,
                    "cause_of_loss": claim.cause_of_loss,
                    "description": claim.description,
                    "incurred_amount": claim.incurred_amount,
                    "paid_amount": claim.paid_amount,
                    "reserve_amount": claim.reserve_amount,
                    "status": claim.status,
                })
            })
            .collect::<Vec<_>>());
        let tables_json: Vec<JsonValue> = document_tables
            .iter()
            .map(|table| {
                let mut value = json!({
                    "table_id": format!("tbl-{}", &table.id.to_string()[..8]),
                    "stable_table_id": table.stable_table_id,
                    "page_number": table.page_number,
                    "table_type": table.table_type.as_str(),
                    "num_rows": table.num_rows,
                    "num_cols": table.num_cols,
                    "canonical_headers": table.canonical_headers,
                    "classification_confidence": table.classification_confidence,
                });
                if let Some(markdown) = &table.raw_markdown {
                    let capped: String = markdown.chars().take(1000).collect();
                    value["raw_markdown"] = JsonValue::String(capped);
                }
                value
            })
            .collect();

        // Group chunks by section for batching.
        let mut section_chunks: BTreeMap<String, Vec<BatchChunk>> = BTreeMap::new();
        for chunk in &chunks {
            let section = chunk.section().unwrap_or("unknown").to_lowercase();
            section_chunks
                .entry(section.clone())
                .or_default()
                .push(BatchChunk {
                    chunk_id: chunk.id.to_string(),
                    stable_chunk_id: chunk.stable_chunk_id.clone(),
                    page_number: chunk.page_number,
                    section_type: section,
                    text: chunk.raw_text.clone(),
                    token_count: chunk.token_count,
                });
        }

        let batches = partition_sections(&section_chunks, &sov_json, &claims_json, &tables_json);

        let entities_json = build_entities_json(&canonical_entities, &temp_candidates);

        // Pass 1: semantic batches.
        let mut raw_relationships = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            info!(
                batch_name = %batch.name,
                batch = i + 1,
                total = batches.len(),
                sections = ?batch.sections,
                chunk_count = batch.chunk_count(),
                "processing relationship extraction batch"
            );
            match self
                .run_batch_call(document_type, &entities_json, batch)
                .await
            {
                Ok(mut rels) => {
                    for rel in &mut rels {
                        rel.tag(&batch.name, &batch.sections);
                    }
                    info!(batch_name = %batch.name, count = rels.len(), "batch extracted relationships");
                    raw_relationships.extend(rels);
                }
                Err(err) => {
                    // Stay resilient: a failing batch forfeits only its own
                    // edges.
                    error!(batch_name = %batch.name, error = %err, "batch extraction failed");
                }
            }
        }

        let mut unique = deduplicate_relationships(raw_relationships);

        // Pass 2: cross-batch synthesis.
        match self
            .run_synthesis_call(&canonical_entities, &unique, &batches)
            .await
        {
            Ok(mut synthesized) => {
                if !synthesized.is_empty() {
                    info!(
                        count = synthesized.len(),
                        "cross-batch synthesis discovered additional relationships"
                    );
                    for rel in &mut synthesized {
                        rel.attributes.insert(
                            "extraction_batch".to_string(),
                            JsonValue::String("cross_batch_synthesis".to_string()),
                        );
                        rel.attributes
                            .insert("synthesis_pass".to_string(), JsonValue::Bool(true));
                    }
                    unique.extend(synthesized);
                    unique = deduplicate_relationships(unique);
                }
            }
            Err(err) => {
                error!(error = %err, "cross-batch synthesis pass failed");
            }
        }

        // Persist.
        let mut persisted = Vec::new();
        for raw in unique {
            if let Some(rel) = self
                .persist_relationship(document_id, workflow_id, raw, &canonical_entities, &temp_index)
                .await?
            {
                persisted.push(rel);
            }
        }

        info!(
            %document_id,
            relationships = persisted.len(),
            "relationship extraction completed"
        );
        Ok(persisted)
    }

    /// Canonical entities for the document, resolving from raw mentions when
    /// none have been linked yet.
    async fn fetch_canonical_entities(
        &self,
        document_id: Uuid,
        workflow_id: Option<Uuid>,
    ) -> Result<Vec<CanonicalEntity>, EnrichError> {
        let canonical = self.canonical_repo.get_by_document(document_id).await?;
        if !canonical.is_empty() {
            return Ok(canonical);
        }

        warn!(%document_id, "no canonical entities via evidence, resolving from entity_mentions");
        let mentions = self.mention_repo.get_by_document(document_id).await?;
        if mentions.is_empty() {
            return Ok(Vec::new());
        }
        let candidates: Vec<EntityCandidate> =
            mentions.iter().map(EntityCandidate::from_mention).collect();
        let ids = self
            .resolver
            .resolve_entities_batch(&candidates, None, document_id, workflow_id)
            .await?;
        Ok(self.canonical_repo.get_many(&ids).await?)
    }

    /// Chunk-level candidates from mentions, with temp ids and a mention
    /// index for later reconciliation.
    async fn build_chunk_candidates(
        &self,
        document_id: Uuid,
    ) -> Result<(Vec<JsonValue>, TempIndex), EnrichError> {
        let mentions = self.mention_repo.get_by_document(document_id).await?;
        let mut candidates = Vec::with_capacity(mentions.len());
        let mut index = TempIndex::new();

        for mention in &mentions {
            let normalized_value = mention.normalized_value();
            let temp_id = temp_entity_id(mention.id, &mention.entity_type, &normalized_value);
            index.insert(
                mention.id,
                (mention.entity_type.clone(), normalized_value.clone()),
            );
            candidates.push(json!({
                "entity_id": temp_id,
                "entity_type": mention.entity_type.as_str(),
                "value": normalized_value,
                "confidence": mention.confidence,
                "source": "chunk_level",
                "chunk_id": mention.source_document_chunk_id,
                "mention_id": mention.id,
            }));
        }
        Ok((candidates, index))
    }

    async fn run_batch_call(
        &self,
        document_type: &str,
        entities_json: &JsonValue,
        batch: &SemanticBatch,
    ) -> Result<Vec<RawRelationship>, EnrichError> {
        let user_message = build_batch_user_message(document_type, entities_json, batch);
        self.execute_llm_call(&user_message, RELATIONSHIP_EXTRACTION_PROMPT)
            .await
    }

    async fn run_synthesis_call(
        &self,
        canonical_entities: &[CanonicalEntity],
        existing: &[RawRelationship],
        batches: &[SemanticBatch],
    ) -> Result<Vec<RawRelationship>, EnrichError> {
        if canonical_entities.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = build_synthesis_prompt(canonical_entities, existing, batches);
        self.execute_llm_call(&prompt, RELATIONSHIP_EXTRACTION_PROMPT)
            .await
    }

    async fn execute_llm_call(
        &self,
        user_message: &str,
        system_instruction: &str,
    ) -> Result<Vec<RawRelationship>, EnrichError> {
        let config = GenerationConfig::json_with_cap(MAX_OUTPUT_TOKENS);
        let raw = self
            .llm
            .generate_content(user_message, system_instruction, &config)
            .await?;

        let Some(parsed) = parse_json_safely(&raw) else {
            warn!("failed to parse relationship payload, treating as empty");
            return Ok(Vec::new());
        };
        let relationships = parsed
            .get("relationships")
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(RawRelationship::from_json)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(relationships)
    }

    /// Validate, reconcile, and persist one raw relationship. Returns `None`
    /// when the edge is discarded.
    async fn persist_relationship(
        &self,
        document_id: Uuid,
        workflow_id: Option<Uuid>,
        raw: RawRelationship,
        canonical_entities: &[CanonicalEntity],
        temp_index: &TempIndex,
    ) -> Result<Option<EntityRelationship>, EnrichError> {
        let rel_type = match RelationshipType::parse(&raw.rel_type_raw) {
            Ok(ty) => ty,
            Err(_) => {
                warn!(rel_type = %raw.rel_type_raw, "invalid relationship type, discarding");
                return Ok(None);
            }
        };

        if raw.confidence < MIN_RELATIONSHIP_CONFIDENCE {
            warn!(
                rel_type = %rel_type,
                confidence = raw.confidence,
                "relationship below confidence floor, discarding"
            );
            return Ok(None);
        }

        if raw.evidence.is_empty() {
            warn!(rel_type = %rel_type, "relationship carries no evidence, discarding");
            return Ok(None);
        }

        let temp = (!temp_index.is_empty()).then_some(temp_index);
        let source = find_entity(&raw.source_id, canonical_entities, temp);
        let target = find_entity(&raw.target_id, canonical_entities, temp);
        let (Some(source), Some(target)) = (source, target) else {
            warn!(
                source_id = %raw.source_id,
                target_id = %raw.target_id,
                rel_type = %rel_type,
                source_found = source.is_some(),
                "could not find entities for relationship"
            );
            return Ok(None);
        };

        if source.id == target.id && !rel_type.is_reflexive() {
            warn!(rel_type = %rel_type, "self-loop on non-reflexive type, discarding");
            return Ok(None);
        }

        let mut attributes: Map<String, JsonValue> = raw.attributes;
        // Lift table references out of evidence for quick filtering.
        for ev in &raw.evidence {
            if let Some(obj) = ev.as_object() {
                if let Some(sov_id) = obj.get("sov_id") {
                    attributes.insert("sov_reference".to_string(), sov_id.clone());
                }
                if let Some(claim_id) = obj.get("claim_id") {
                    attributes.insert("claim_reference".to_string(), claim_id.clone());
                }
            }
        }
        attributes.insert("evidence".to_string(), JsonValue::Array(raw.evidence));

        let relationship = self
            .relationship_repo
            .create(
                Some(document_id),
                source.id,
                target.id,
                rel_type,
                raw.confidence,
                JsonValue::Object(attributes),
            )
            .await?;

        if let Some(workflow_id) = workflow_id {
            self.scope_repo
                .add_relationship(workflow_id, relationship.id)
                .await?;
        }

        info!(
            source_type = %source.entity_type,
            source_key = %&source.canonical_key[..8.min(source.canonical_key.len())],
            target_type = %target.entity_type,
            target_key = %&target.canonical_key[..8.min(target.canonical_key.len())],
            rel_type = %rel_type,
            "created relationship"
        );
        Ok(Some(relationship))
    }
}

/// Entity list handed to the LLM: canonical rows (keyed by canonical_key)
/// plus any temp chunk-level candidates.
fn build_entities_json(
    canonical_entities: &[CanonicalEntity],
    temp_candidates: &[JsonValue],
) -> JsonValue {
    let mut entities: Vec<JsonValue> = canonical_entities
        .iter()
        .map(|entity| {
            let attrs = entity.attributes.as_object();
            let value = entity.normalized_value().unwrap_or_default();
            let confidence = entity
                .attributes
                .get("confidence")
                .and_then(JsonValue::as_f64)
                .unwrap_or(0.9);
            let mut info = json!({
                "entity_id": entity.canonical_key,
                "entity_type": entity.entity_type.as_str(),
                "value": value,
                "confidence": confidence,
                "source": "canonical",
            });
            if let Some(attrs) = attrs {
                for (key, attr_value) in attrs {
                    if !matches!(key.as_str(), "normalized_value" | "raw_value" | "confidence") {
                        info[format!("attr_{key}")] = attr_value.clone();
                    }
                }
            }
            info
        })
        .collect();
    entities.extend(temp_candidates.iter().cloned());
    JsonValue::Array(entities)
}

/// Batch user message: document type, batch context, entity inventory,
/// section content with per-chunk caps, and routed table data.
fn build_batch_user_message(
    document_type: &str,
    entities_json: &JsonValue,
    batch: &SemanticBatch,
) -> String {
    let entity_count = entities_json.as_array().map(Vec::len).unwrap_or(0);

    let mut entity_summary: BTreeMap<String, usize> = BTreeMap::new();
    if let Some(entities) = entities_json.as_array() {
        for entity in entities {
            if let Some(ty) = entity.get("entity_type").and_then(JsonValue::as_str) {
                *entity_summary.entry(ty.to_string()).or_default() += 1;
            }
        }
    }
    let entity_breakdown = entity_summary
        .iter()
        .map(|(ty, count)| format!("   {ty}: {count}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut chunks_text = String::new();
    let section_titles = batch
        .sections
        .iter()
        .map(|s| title_case(s))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(chunks_text, "### Batch: {}", batch.description);
    let _ = writeln!(chunks_text, "### Sections included: {section_titles}");
    for section in &batch.sections {
        let _ = writeln!(chunks_text, "\n## {} Section", title_case(section));
        for chunk in batch.chunks.iter().filter(|c| &c.section_type == section) {
            let short_id: String = chunk.chunk_id.chars().take(8).collect();
            let _ = writeln!(chunks_text, "\n[Chunk {short_id}...]");
            if chunk.text.chars().count() > CHUNK_TEXT_LIMIT {
                let capped: String = chunk.text.chars().take(CHUNK_TEXT_LIMIT).collect();
                let _ = writeln!(chunks_text, "{capped}\n... (truncated)");
            } else {
                let _ = writeln!(chunks_text, "{}", chunk.text);
            }
        }
    }

    let expected_rels = if batch.expected_rels.is_empty() {
        "any valid relationships".to_string()
    } else {
        batch
            .expected_rels
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Extract relationships from this {document_type} document.\n\n\
         BATCH CONTEXT: {description}\n\
         You are analyzing a semantically grouped batch containing MULTIPLE SECTIONS that commonly have cross-section relationships.\n\
         This allows you to see both sides of relationships (e.g., Policy in declarations + Coverage in coverages).\n\n\
         Sections in this batch: {section_titles}\n\
         Expected relationship types: {expected_rels}\n\n\
         Entity Summary ({entity_count} total available for linking):\n{entity_breakdown}\n\n\
         CANONICAL ENTITIES (deduplicated, normalized)\n{entities}\n\n\
         SECTION CONTENT (Multi-section batch - look for cross-section links!)\n{chunks_text}\n\
         TABLE DATA (Routed to this batch only)\n\
         SOV Items:\n{sov}\n\n\
         Loss Run Claims:\n{claims}\n\n\
         Document Tables:\n{tables}\n\n\
         Prioritize extracting {expected_rels} from this batch, but do not limit yourself to these.\n\
         Each relationship MUST have evidence (text quote OR table reference).\n\
         Return ONLY valid JSON following the schema. NO markdown backticks, NO explanations.",
        description = batch.description,
        entities = entities_json,
        sov = batch.sov_items_json,
        claims = batch.loss_run_claims_json,
        tables = batch.document_tables_json,
    )
}

/// Synthesis prompt: entity inventory by type, batch manifest, and existing
/// edges grouped by originating batch.
fn build_synthesis_prompt(
    canonical_entities: &[CanonicalEntity],
    existing: &[RawRelationship],
    batches: &[SemanticBatch],
) -> String {
    let mut by_type: BTreeMap<&str, Vec<&CanonicalEntity>> = BTreeMap::new();
    for entity in canonical_entities {
        by_type.entry(entity.entity_type.as_str()).or_default().push(entity);
    }
    let mut entities_section = String::new();
    for (entity_type, entities) in &by_type {
        let _ = writeln!(
            entities_section,
            "\n#### {entity_type} ({} entities)",
            entities.len()
        );
        for entity in entities.iter().take(SYNTHESIS_ENTITIES_PER_TYPE) {
            let name = entity
                .attribute_str("name")
                .or_else(|| entity.attribute_str("title"))
                .or_else(|| entity.attribute_str("term"))
                .or_else(|| entity.normalized_value())
                .unwrap_or("N/A");
            let _ = writeln!(entities_section, "- ID: {}, Name: {name}", entity.canonical_key);
        }
        if entities.len() > SYNTHESIS_ENTITIES_PER_TYPE {
            let _ = writeln!(
                entities_section,
                "  ... and {} more",
                entities.len() - SYNTHESIS_ENTITIES_PER_TYPE
            );
        }
    }

    let mut batches_section = String::new();
    for batch in batches {
        let _ = writeln!(batches_section, "\n#### {}: {}", batch.name, batch.description);
        let _ = writeln!(batches_section, "- Sections: {}", batch.sections.join(", "));
        let expected = batch
            .expected_rels
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(batches_section, "- Expected relationships: {expected}");
    }

    let mut by_batch: BTreeMap<String, Vec<&RawRelationship>> = BTreeMap::new();
    for rel in existing {
        let batch = rel
            .attributes
            .get("extraction_batch")
            .and_then(JsonValue::as_str)
            .unwrap_or("unknown")
            .to_string();
        by_batch.entry(batch).or_default().push(rel);
    }
    let mut relationships_section = String::new();
    for (batch, rels) in &by_batch {
        let _ = writeln!(
            relationships_section,
            "\n#### Batch: {batch} ({} relationships)",
            rels.len()
        );
        for rel in rels.iter().take(SYNTHESIS_RELS_PER_BATCH) {
            let _ = writeln!(
                relationships_section,
                "- {} --[{}]--> {}",
                rel.source_id, rel.rel_type_raw, rel.target_id
            );
        }
        if rels.len() > SYNTHESIS_RELS_PER_BATCH {
            let _ = writeln!(
                relationships_section,
                "  ... and {} more",
                rels.len() - SYNTHESIS_RELS_PER_BATCH
            );
        }
    }

    CROSS_BATCH_SYNTHESIS_PROMPT
        .replace("{entities_by_type}", &entities_section)
        .replace("{semantic_batches_info}", &batches_section)
        .replace("{existing_relationships}", &relationships_section)
}

fn title_case(section: &str) -> String {
    section
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::BatchChunk;
    use chrono::Utc;
    use domain::EntityType;

    fn canonical(entity_type: EntityType, value: &str) -> CanonicalEntity {
        CanonicalEntity {
            id: Uuid::new_v4(),
            entity_type: entity_type.clone(),
            canonical_key: domain::canonical_key(entity_type.as_str(), value),
            attributes: json!({"normalized_value": value}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn batch(sections: &[&str], chunk_text: &str) -> SemanticBatch {
        SemanticBatch {
            name: "policy_coverage".into(),
            description: "Policy to coverage links".into(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
            expected_rels: vec![RelationshipType::HasCoverage],
            priority: 2,
            chunks: sections
                .iter()
                .map(|s| BatchChunk {
                    chunk_id: Uuid::new_v4().to_string(),
                    stable_chunk_id: format!("doc_x_p1_c0_{s}"),
                    page_number: 1,
                    section_type: s.to_string(),
                    text: chunk_text.to_string(),
                    token_count: 5,
                })
                .collect(),
            sov_items_json: JsonValue::Array(Vec::new()),
            loss_run_claims_json: JsonValue::Array(Vec::new()),
            document_tables_json: JsonValue::Array(Vec::new()),
        }
    }

    #[test]
    fn batch_message_carries_sections_entities_and_expectations() {
        let entities = build_entities_json(
            &[
                canonical(EntityType::Policy, "POL-1"),
                canonical(EntityType::Coverage, "Business Income"),
            ],
            &[],
        );
        let message =
            build_batch_user_message("policy", &entities, &batch(&["declarations", "coverages"], "text"));
        assert!(message.contains("Declarations Section"));
        assert!(message.contains("Coverages Section"));
        assert!(message.contains("HAS_COVERAGE"));
        assert!(message.contains("POL-1"));
        assert!(message.contains("Business Income"));
    }

    #[test]
    fn batch_message_caps_chunk_text() {
        let entities = build_entities_json(&[canonical(EntityType::Policy, "POL-1")], &[]);
        let long_text = "x".repeat(5000);
        let message =
            build_batch_user_message("policy", &entities, &batch(&["declarations"], &long_text));
        assert!(message.contains("... (truncated)"));
        // The full 5000-char run must not appear.
        assert!(!message.contains(&long_text));
    }

    #[test]
    fn synthesis_prompt_caps_entities_per_type() {
        let entities: Vec<CanonicalEntity> = (0..25)
            .map(|i| canonical(EntityType::Coverage, &format!("Coverage {i}")))
            .collect();
        let prompt = build_synthesis_prompt(&entities, &[], &[]);
        assert!(prompt.contains("Coverage (25 entities)"));
        assert!(prompt.contains("... and 5 more"));
    }

    #[test]
    fn synthesis_prompt_groups_existing_by_batch() {
        let entities = vec![canonical(EntityType::Policy, "POL-1")];
        let mut rel = RawRelationship {
            source_id: "a".into(),
            target_id: "b".into(),
            rel_type_raw: "HAS_COVERAGE".into(),
            confidence: 0.9,
            evidence: vec![json!({"quote": "q"})],
            attributes: Map::new(),
        };
        rel.tag("policy_coverage", &["declarations".into(), "coverages".into()]);
        let prompt = build_synthesis_prompt(&entities, &[rel], &[]);
        assert!(prompt.contains("Batch: policy_coverage"));
        assert!(prompt.contains("a --[HAS_COVERAGE]--> b"));
    }

    #[test]
    fn title_case_formats_section_names() {
        assert_eq!(title_case("loss_run"), "Loss Run");
        assert_eq!(title_case("declarations"), "Declarations");
    }
}
