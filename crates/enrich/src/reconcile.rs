//! Reconciliation of LLM-emitted relationship endpoints to canonical rows,
//! plus relationship deduplication.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use domain::{CanonicalEntity, EntityType};

/// A relationship as the LLM emitted it, before endpoint resolution.
#[derive(Debug, Clone)]
pub struct RawRelationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type_raw: String,
    pub confidence: f64,
    pub evidence: Vec<JsonValue>,
    pub attributes: Map<String, JsonValue>,
}

impl RawRelationship {
    /// Parse one relationship object, tolerating the id/type key variants
    /// different model generations produce.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let obj = value.as_object()?;
        let source_id = obj
            .get("source_entity_id")
            .or_else(|| obj.get("source_canonical_id"))
            .and_then(JsonValue::as_str)?
            .to_string();
        let target_id = obj
            .get("target_entity_id")
            .or_else(|| obj.get("target_canonical_id"))
            .and_then(JsonValue::as_str)?
            .to_string();
        let rel_type_raw = obj
            .get("type")
            .or_else(|| obj.get("relationship_type"))
            .and_then(JsonValue::as_str)?
            .to_string();
        let confidence = obj
            .get("confidence")
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.8);

        let mut attributes = obj
            .get("attributes")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        let evidence = obj
            .get("evidence")
            .or_else(|| attributes.get("evidence").map(|v| v as &JsonValue))
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();
        attributes.remove("evidence");

        Some(Self {
            source_id,
            target_id,
            rel_type_raw,
            confidence,
            evidence,
            attributes,
        })
    }

    pub fn tag(&mut self, batch_name: &str, sections: &[String]) {
        self.attributes.insert(
            "extraction_batch".to_string(),
            JsonValue::String(batch_name.to_string()),
        );
        self.attributes.insert(
            "extraction_sections".to_string(),
            JsonValue::Array(
                sections
                    .iter()
                    .map(|s| JsonValue::String(s.clone()))
                    .collect(),
            ),
        );
    }

    fn dedup_key(&self) -> (String, String, String) {
        (
            self.source_id.clone(),
            self.target_id.clone(),
            self.rel_type_raw.to_uppercase(),
        )
    }
}

/// Deduplicate by `(source, target, type)`: union evidence (deduped by
/// value), keep max confidence, first occurrence wins on other fields.
pub fn deduplicate_relationships(relationships: Vec<RawRelationship>) -> Vec<RawRelationship> {
    let mut order: Vec<(String, String, String)> = Vec::new();
    let mut seen: HashMap<(String, String, String), RawRelationship> = HashMap::new();

    for rel in relationships {
        if rel.source_id.is_empty() || rel.target_id.is_empty() || rel.rel_type_raw.is_empty() {
            continue;
        }
        let key = rel.dedup_key();
        match seen.get_mut(&key) {
            None => {
                order.push(key.clone());
                seen.insert(key, rel);
            }
            Some(existing) => {
                for ev in rel.evidence {
                    if !existing.evidence.contains(&ev) {
                        existing.evidence.push(ev);
                    }
                }
                if rel.confidence > existing.confidence {
                    existing.confidence = rel.confidence;
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| seen.remove(&key))
        .collect()
}

/// Lookup from mention id to `(entity_type, normalized_value)` for temp-id
/// reconciliation.
pub type TempIndex = HashMap<Uuid, (EntityType, String)>;

/// Mint the temporary id used for chunk-level candidates when canonical
/// entities are sparse.
pub fn temp_entity_id(mention_id: Uuid, entity_type: &EntityType, normalized_value: &str) -> String {
    let value_hash = &domain::canonical_key(entity_type.as_str(), normalized_value)[..8];
    let id = format!("temp_{mention_id}_{}_{value_hash}", entity_type.as_str());
    id.chars().take(64).collect()
}

/// Find a canonical entity for an LLM-provided identifier.
///
/// Strategies, in order: exact canonical_key; `attributes.id` /
/// `attributes.entity_id`; `type:value`; case-insensitive normalized value;
/// substring containment (identifier longer than 3 chars); `temp_*`
/// reconciliation through the mention index.
pub fn find_entity<'a>(
    identifier: &str,
    canonical_entities: &'a [CanonicalEntity],
    temp_index: Option<&TempIndex>,
) -> Option<&'a CanonicalEntity> {
    // 1. Exact canonical_key.
    if let Some(entity) = canonical_entities
        .iter()
        .find(|e| e.canonical_key == identifier)
    {
        return Some(entity);
    }

    // 2. Stable id stored in attributes by the resolver.
    if let Some(entity) = canonical_entities.iter().find(|e| {
        e.attribute_str("id") == Some(identifier) || e.attribute_str("entity_id") == Some(identifier)
    }) {
        return Some(entity);
    }

    // 3. `type:value` form.
    if let Some((entity_type, value)) = identifier.split_once(':') {
        if let Some(entity) = canonical_entities.iter().find(|e| {
            e.entity_type.as_str().eq_ignore_ascii_case(entity_type)
                && e.normalized_value()
                    .map(|v| v.eq_ignore_ascii_case(value))
                    .unwrap_or(false)
        }) {
            return Some(entity);
        }
    }

    // 4. Case-insensitive normalized-value equality.
    let identifier_lower = identifier.to_lowercase();
    let identifier_trimmed = identifier_lower.trim();
    if let Some(entity) = canonical_entities.iter().find(|e| {
        e.normalized_value()
            .map(|v| v.to_lowercase().trim() == identifier_trimmed)
            .unwrap_or(false)
    }) {
        return Some(entity);
    }

    // 5. Substring containment for identifiers with real length.
    if identifier_trimmed.len() > 3 {
        if let Some(entity) = canonical_entities.iter().find(|e| {
            e.normalized_value()
                .map(|v| {
                    let v = v.to_lowercase();
                    let v = v.trim();
                    v.contains(identifier_trimmed) || identifier_trimmed.contains(v)
                })
                .unwrap_or(false)
        }) {
            return Some(entity);
        }
    }

    // 6. Temp-id reconciliation: temp_{mention_uuid}_{type}_{hash}.
    if let (Some(index), Some(rest)) = (temp_index, identifier.strip_prefix("temp_")) {
        // The uuid occupies the first 36 characters of the remainder.
        if rest.len() >= 36 {
            if let Ok(mention_id) = Uuid::parse_str(&rest[..36]) {
                if let Some((entity_type, normalized_value)) = index.get(&mention_id) {
                    let key = domain::canonical_key(entity_type.as_str(), normalized_value);
                    if let Some(entity) =
                        canonical_entities.iter().find(|e| e.canonical_key == key)
                    {
                        debug!(identifier, canonical_key = %key, "reconciled temp entity to canonical");
                        return Some(entity);
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn canonical(entity_type: EntityType, value: &str) -> CanonicalEntity {
        let key = domain::canonical_key(entity_type.as_str(), value);
        let id = domain::entity_id(entity_type.as_str(), value);
        CanonicalEntity {
            id: Uuid::new_v4(),
            entity_type,
            canonical_key: key,
            attributes: json!({"normalized_value": value, "id": id}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn raw_relationship_parses_both_key_forms() {
        let a = RawRelationship::from_json(&json!({
            "source_entity_id": "s", "target_entity_id": "t",
            "type": "HAS_COVERAGE", "confidence": 0.9,
            "evidence": [{"quote": "..." }],
        }))
        .unwrap();
        assert_eq!(a.rel_type_raw, "HAS_COVERAGE");
        assert_eq!(a.evidence.len(), 1);

        let b = RawRelationship::from_json(&json!({
            "source_canonical_id": "s", "target_canonical_id": "t",
            "relationship_type": "EXCLUDES",
            "attributes": {"evidence": [{"quote": "q"}]},
        }))
        .unwrap();
        assert_eq!(b.rel_type_raw, "EXCLUDES");
        assert_eq!(b.evidence.len(), 1);
        assert!(!b.attributes.contains_key("evidence"));
    }

    #[test]
    fn dedup_unions_evidence_and_takes_max_confidence() {
        let mk = |conf: f64, quote: &str| RawRelationship {
            source_id: "s".into(),
            target_id: "t".into(),
            rel_type_raw: "HAS_COVERAGE".into(),
            confidence: conf,
            evidence: vec![json!({"quote": quote})],
            attributes: Map::new(),
        };
        let deduped = deduplicate_relationships(vec![mk(0.8, "a"), mk(0.95, "b"), mk(0.7, "a")]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].confidence, 0.95);
        assert_eq!(deduped[0].evidence.len(), 2);
    }

    #[test]
    fn find_entity_by_canonical_key() {
        let entities = vec![canonical(EntityType::Policy, "POL-8888")];
        let found = find_entity(&entities[0].canonical_key.clone(), &entities, None);
        assert!(found.is_some());
    }

    #[test]
    fn find_entity_by_attribute_id() {
        let entities = vec![canonical(EntityType::Coverage, "General Liability")];
        let id = domain::entity_id("Coverage", "General Liability");
        assert!(find_entity(&id, &entities, None).is_some());
    }

    #[test]
    fn find_entity_by_type_value_form() {
        let entities = vec![canonical(EntityType::Policy, "POL-8888")];
        assert!(find_entity("policy:pol-8888", &entities, None).is_some());
    }

    #[test]
    fn find_entity_by_value_and_substring() {
        let entities = vec![canonical(EntityType::Organization, "Acme Insurance Co")];
        assert!(find_entity("acme insurance co", &entities, None).is_some());
        assert!(find_entity("Acme Insurance", &entities, None).is_some());
        // Too-short fragments never substring-match.
        assert!(find_entity("Acm", &entities, None).is_none());
    }

    #[test]
    fn find_entity_reconciles_temp_ids() {
        let entities = vec![canonical(EntityType::Coverage, "Business Income")];
        let mention_id = Uuid::new_v4();
        let mut index = TempIndex::new();
        index.insert(
            mention_id,
            (EntityType::Coverage, "Business Income".to_string()),
        );
        let temp = temp_entity_id(mention_id, &EntityType::Coverage, "Business Income");
        assert!(find_entity(&temp, &entities, Some(&index)).is_some());
        assert!(find_entity(&temp, &entities, None).is_none());
    }

    #[test]
    fn find_entity_misses_unknown() {
        let entities = vec![canonical(EntityType::Policy, "POL-1")];
        assert!(find_entity("does-not-exist-anywhere", &entities, None).is_none());
    }
}
