//! Document entity aggregation.
//!
//! Gathers mention candidates from persisted `entity_mentions` (preferred,
//! document-aligned) or from `section_extractions.extracted_fields.entities`
//! (fallback, synthesizing from structured lists when the explicit list is
//! missing), deduplicates by deterministic entity id, applies the quality
//! filter, and optionally enriches with rich extraction context.

use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use domain::EntityType;
use store::{EntityMentionRepository, SectionExtractionRepository};

use crate::candidate::EntityCandidate;
use crate::filter::{filter_low_quality, FilterStats};
use crate::synthesizer::synthesize_entities;
use crate::EnrichError;

/// Maps a chunk to the entity ids it carries.
#[derive(Debug, Clone)]
pub struct ChunkEntityMapping {
    pub chunk_id: Uuid,
    pub entity_ids: Vec<String>,
}

/// Result of entity aggregation across a document.
#[derive(Debug)]
pub struct AggregatedEntities {
    pub entities: Vec<EntityCandidate>,
    pub chunk_entity_map: Vec<ChunkEntityMapping>,
    pub total_chunks: usize,
    pub total_entities: usize,
    pub unique_entities: usize,
    pub filter_stats: FilterStats,
}

/// Rich data handed down from the extraction stage.
#[derive(Debug, Clone, Default)]
pub struct RichContext {
    pub effective_coverages: Vec<JsonValue>,
    pub effective_exclusions: Vec<JsonValue>,
    pub step_section_outputs: Vec<JsonValue>,
}

impl RichContext {
    pub fn is_empty(&self) -> bool {
        self.effective_coverages.is_empty()
            && self.effective_exclusions.is_empty()
            && self.step_section_outputs.is_empty()
    }
}

pub struct EntityAggregator {
    mention_repo: EntityMentionRepository,
    extraction_repo: SectionExtractionRepository,
}

impl EntityAggregator {
    pub fn new(
        mention_repo: EntityMentionRepository,
        extraction_repo: SectionExtractionRepository,
    ) -> Self {
        Self {
            mention_repo,
            extraction_repo,
        }
    }

    /// Aggregate, filter, deduplicate, and enrich entity candidates for one
    /// document.
    pub async fn aggregate_entities(
        &self,
        document_id: Uuid,
        workflow_id: Uuid,
        rich_context: Option<&RichContext>,
    ) -> Result<AggregatedEntities, EnrichError> {
        info!(%document_id, %workflow_id, "starting entity aggregation");

        let mentions = self.mention_repo.get_by_document(document_id).await?;

        let (all_candidates, chunk_mappings, total_chunks) = if !mentions.is_empty() {
            info!(%document_id, count = mentions.len(), "using entity_mentions table");
            let mut candidates = Vec::with_capacity(mentions.len());
            let mut mappings = Vec::new();
            for mention in &mentions {
                let candidate = EntityCandidate::from_mention(mention);
                if let Some(chunk_id) = mention.source_document_chunk_id {
                    mappings.push(ChunkEntityMapping {
                        chunk_id,
                        entity_ids: vec![candidate.entity_id.clone()],
                    });
                }
                candidates.push(candidate);
            }
            let chunk_count = mappings
                .iter()
                .map(|m| m.chunk_id)
                .collect::<HashSet<_>>()
                .len();
            (candidates, mappings, chunk_count)
        } else {
            info!(%document_id, "no entity mentions found, falling back to section_extractions");
            self.candidates_from_extractions(document_id).await?
        };

        let total_entities = all_candidates.len();
        let (filtered, filter_stats) = filter_low_quality(all_candidates);
        let mut unique = deduplicate(filtered);

        if let Some(rich) = rich_context.filter(|r| !r.is_empty()) {
            enrich_with_rich_context(&mut unique, rich);
        }

        if filter_stats.total_filtered > 0 {
            info!(
                %document_id,
                original_count = total_entities,
                filtered_count = filter_stats.total_filtered,
                low_confidence = filter_stats.low_confidence,
                generic_names = filter_stats.generic_names,
                section_references = filter_stats.section_references,
                short_names = filter_stats.short_names,
                "entity quality filtering applied"
            );
        }

        let result = AggregatedEntities {
            unique_entities: unique.len(),
            entities: unique,
            chunk_entity_map: chunk_mappings,
            total_chunks,
            total_entities,
            filter_stats,
        };
        info!(
            %document_id,
            total_chunks = result.total_chunks,
            total_entities = result.total_entities,
            unique_entities = result.unique_entities,
            "entity aggregation completed"
        );
        Ok(result)
    }

    async fn candidates_from_extractions(
        &self,
        document_id: Uuid,
    ) -> Result<(Vec<EntityCandidate>, Vec<ChunkEntityMapping>, usize), EnrichError> {
        let extractions = self.extraction_repo.get_by_document(document_id).await?;

        let mut candidates = Vec::new();
        let mut mappings = Vec::new();
        let mut chunk_ids = HashSet::new();

        for extraction in &extractions {
            let mut from_section: Vec<EntityCandidate> = match extraction.entities() {
                Some(entities) if !entities.is_empty() => entities
                    .iter()
                    .filter_map(|e| {
                        let candidate = EntityCandidate::from_json(e);
                        if candidate.is_none() {
                            warn!(
                                section_type = %extraction.section_type,
                                "entity missing required fields, skipping"
                            );
                        }
                        candidate
                    })
                    .collect(),
                _ => synthesize_entities(&extraction.extracted_fields, &extraction.section_type),
            };

            if from_section.is_empty() {
                continue;
            }

            let stable_ids = &extraction.source_chunks.stable_chunk_ids;
            for candidate in &mut from_section {
                candidate.section_extraction_id = Some(extraction.id);
                if candidate.source_stable_chunk_id.is_none() {
                    candidate.source_stable_chunk_id = stable_ids.first().cloned();
                }
            }

            let entity_ids: Vec<String> =
                from_section.iter().map(|c| c.entity_id.clone()).collect();
            for chunk_id in &extraction.source_chunks.chunk_ids {
                chunk_ids.insert(*chunk_id);
                mappings.push(ChunkEntityMapping {
                    chunk_id: *chunk_id,
                    entity_ids: entity_ids.clone(),
                });
            }

            debug!(
                section_type = %extraction.section_type,
                count = from_section.len(),
                "normalized entities from section extraction"
            );
            candidates.append(&mut from_section);
        }

        Ok((candidates, mappings, chunk_ids.len()))
    }
}

/// Deduplicate by entity id: keep the highest-confidence candidate and union
/// source chunk ids across the group.
pub fn deduplicate(candidates: Vec<EntityCandidate>) -> Vec<EntityCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<EntityCandidate>> = HashMap::new();
    for candidate in candidates {
        let id = candidate.entity_id.clone();
        if !groups.contains_key(&id) {
            order.push(id.clone());
        }
        groups.entry(id).or_default().push(candidate);
    }

    let mut unique = Vec::with_capacity(order.len());
    for id in order {
        let group = groups.remove(&id).unwrap_or_default();
        let dropped = group.len().saturating_sub(1);

        let mut source_chunks: Vec<String> = Vec::new();
        for candidate in &group {
            if let Some(stable) = &candidate.source_stable_chunk_id {
                if !source_chunks.contains(stable) {
                    source_chunks.push(stable.clone());
                }
            }
            for extra in &candidate.source_chunk_ids {
                if !source_chunks.contains(extra) {
                    source_chunks.push(extra.clone());
                }
            }
        }

        let mut best = group
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .expect("group is non-empty");
        best.source_chunk_ids = source_chunks;
        if dropped > 0 {
            debug!(
                entity_id = %best.entity_id,
                kept_confidence = best.confidence,
                dropped_count = dropped,
                "deduplicated entity candidates"
            );
        }
        unique.push(best);
    }
    unique
}

/// Merge description/source_text and other rich attributes into candidates.
///
/// Lookups go through the deterministic entity id first, then fall back to a
/// name-based id; candidates matching neither are left as-is.
fn enrich_with_rich_context(entities: &mut [EntityCandidate], rich: &RichContext) {
    let coverage_map = build_named_map(&rich.effective_coverages, "Coverage", &["coverage_name"]);
    let exclusion_map =
        build_named_map(&rich.effective_exclusions, "Exclusion", &["exclusion_name"]);
    let section_map = build_section_lookup(&rich.step_section_outputs);

    let mut enriched_count = 0usize;
    for entity in entities.iter_mut() {
        let rich_item: Option<&JsonValue> = match &entity.entity_type {
            EntityType::Coverage => coverage_map
                .get(&entity.entity_id)
                .copied()
                .or_else(|| secondary_lookup(entity, "Coverage", &["coverage_name"], &coverage_map)),
            EntityType::Exclusion => exclusion_map.get(&entity.entity_id).copied().or_else(|| {
                secondary_lookup(
                    entity,
                    "Exclusion",
                    &["title", "exclusion_name"],
                    &exclusion_map,
                )
            }),
            _ => None,
        };
        let rich_item = rich_item.or_else(|| section_map.get(&entity.entity_id).copied());

        let Some(rich_item) = rich_item else { continue };
        let Some(obj) = rich_item.as_object() else { continue };

        for (key, value) in obj {
            if key == "entity_id" || value.is_null() {
                continue;
            }
            entity.attributes.insert(key.clone(), value.clone());
        }
        enriched_count += 1;
    }

    if enriched_count > 0 {
        info!(enriched = enriched_count, total = entities.len(), "entities enriched with rich context");
    }
}

fn build_named_map<'a>(
    items: &'a [JsonValue],
    entity_type: &str,
    name_fields: &[&str],
) -> HashMap<String, &'a JsonValue> {
    let mut map = HashMap::new();
    for item in items {
        let Some(obj) = item.as_object() else { continue };
        let Some(name) = name_fields
            .iter()
            .find_map(|f| obj.get(*f).and_then(JsonValue::as_str))
        else {
            continue;
        };
        map.insert(domain::entity_id(entity_type, name), item);
    }
    map
}

fn secondary_lookup<'a>(
    entity: &EntityCandidate,
    entity_type: &str,
    name_fields: &[&str],
    map: &HashMap<String, &'a JsonValue>,
) -> Option<&'a JsonValue> {
    let name = name_fields
        .iter()
        .find_map(|f| entity.attributes.get(*f).and_then(JsonValue::as_str))?;
    map.get(&domain::entity_id(entity_type, name)).copied()
}

fn build_section_lookup(outputs: &[JsonValue]) -> HashMap<String, &JsonValue> {
    const TYPE_MAP: [(&str, &str); 4] = [
        ("definitions", "Definition"),
        ("coverages", "Coverage"),
        ("exclusions", "Exclusion"),
        ("conditions", "Condition"),
    ];

    let mut map: HashMap<String, &JsonValue> = HashMap::new();
    for output in outputs {
        let Some(payload) = output.get("display_payload").and_then(JsonValue::as_object) else {
            continue;
        };

        // Generic entities list in the payload.
        if let Some(items) = payload.get("entities").and_then(JsonValue::as_array) {
            for item in items {
                let Some(obj) = item.as_object() else { continue };
                let item_type = obj
                    .get("type")
                    .or_else(|| obj.get("entity_type"))
                    .and_then(JsonValue::as_str);
                let item_name = obj
                    .get("name")
                    .or_else(|| obj.get("normalized_value"))
                    .or_else(|| obj.get("id"))
                    .or_else(|| obj.get("value"))
                    .and_then(JsonValue::as_str);
                if let (Some(ty), Some(name)) = (item_type, item_name) {
                    let id = domain::entity_id(ty, name);
                    let target = obj.get("attributes").unwrap_or(item);
                    map.insert(id, target);
                }
            }
        }

        // Section-specific lists.
        for (list_key, entity_type) in TYPE_MAP {
            let Some(items) = payload.get(list_key).and_then(JsonValue::as_array) else {
                continue;
            };
            for item in items {
                let Some(obj) = item.as_object() else { continue };
                let name = obj
                    .get("term")
                    .or_else(|| obj.get("coverage_name"))
                    .or_else(|| obj.get("exclusion_name"))
                    .or_else(|| obj.get("name"))
                    .or_else(|| obj.get("title"))
                    .and_then(JsonValue::as_str);
                if let Some(name) = name {
                    map.entry(domain::entity_id(entity_type, name)).or_insert(item);
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(ty: EntityType, value: &str, confidence: f64) -> EntityCandidate {
        let mut c = EntityCandidate::new(ty, value);
        c.confidence = confidence;
        c
    }

    #[test]
    fn dedup_keeps_highest_confidence_and_unions_chunks() {
        let mut a = candidate(EntityType::Policy, "POL-1", 0.7);
        a.source_stable_chunk_id = Some("doc_x_p1_c0".into());
        let mut b = candidate(EntityType::Policy, "POL-1", 0.95);
        b.source_stable_chunk_id = Some("doc_x_p2_c1".into());

        let unique = deduplicate(vec![a, b]);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].confidence, 0.95);
        assert_eq!(unique[0].source_chunk_ids.len(), 2);
    }

    #[test]
    fn dedup_preserves_distinct_entities() {
        let unique = deduplicate(vec![
            candidate(EntityType::Policy, "POL-1", 0.9),
            candidate(EntityType::Coverage, "General Liability", 0.9),
        ]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn rich_context_merges_description_by_primary_id() {
        let mut entities = vec![candidate(EntityType::Coverage, "General Liability", 0.9)];
        let rich = RichContext {
            effective_coverages: vec![json!({
                "coverage_name": "General Liability",
                "description": "Covers third-party bodily injury",
                "source_text": "SECTION II - LIABILITY ...",
            })],
            ..Default::default()
        };
        enrich_with_rich_context(&mut entities, &rich);
        assert_eq!(
            entities[0].attributes["description"],
            "Covers third-party bodily injury"
        );
        assert!(entities[0].attributes.contains_key("source_text"));
    }

    #[test]
    fn rich_context_secondary_name_lookup() {
        // Candidate minted from a normalized id, not the display name.
        let mut entity = candidate(EntityType::Exclusion, "excl_flood", 0.9);
        entity
            .attributes
            .insert("title".into(), json!("Flood Exclusion"));
        let rich = RichContext {
            effective_exclusions: vec![json!({
                "exclusion_name": "Flood Exclusion",
                "description": "No coverage for flood damage",
            })],
            ..Default::default()
        };
        let mut entities = vec![entity];
        enrich_with_rich_context(&mut entities, &rich);
        assert_eq!(
            entities[0].attributes["description"],
            "No coverage for flood damage"
        );
    }

    #[test]
    fn rich_context_misses_leave_entity_untouched() {
        let mut entities = vec![candidate(EntityType::Coverage, "Cyber Liability", 0.9)];
        let rich = RichContext {
            effective_coverages: vec![json!({"coverage_name": "Something Else"})],
            ..Default::default()
        };
        enrich_with_rich_context(&mut entities, &rich);
        assert!(!entities[0].attributes.contains_key("description"));
    }

    #[test]
    fn step_section_outputs_feed_definitions() {
        let mut entities = vec![candidate(EntityType::Definition, "Business Income", 0.9)];
        let rich = RichContext {
            step_section_outputs: vec![json!({
                "display_payload": {
                    "definitions": [
                        {"term": "Business Income", "definition_text": "Net income plus expenses"},
                    ],
                },
            })],
            ..Default::default()
        };
        enrich_with_rich_context(&mut entities, &rich);
        assert_eq!(
            entities[0].attributes["definition_text"],
            "Net income plus expenses"
        );
    }
}
