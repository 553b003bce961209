//! Entity candidates: the normalized in-memory form mentions and extraction
//! entities share on their way to canonical resolution.

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use domain::{EntityMention, EntityType};

/// One normalized entity candidate.
#[derive(Debug, Clone)]
pub struct EntityCandidate {
    pub entity_type: EntityType,
    pub normalized_value: String,
    pub raw_value: String,
    pub confidence: f64,
    /// Deterministic id shared with LLM-facing contexts.
    pub entity_id: String,
    pub source_chunk_id: Option<Uuid>,
    pub source_stable_chunk_id: Option<String>,
    pub section_extraction_id: Option<Uuid>,
    /// Chunk ids unioned across deduplicated duplicates.
    pub source_chunk_ids: Vec<String>,
    /// Everything else the extractor carried (description, source_text,
    /// limits, addresses, ...).
    pub attributes: Map<String, JsonValue>,
}

impl EntityCandidate {
    pub fn new(entity_type: EntityType, normalized_value: impl Into<String>) -> Self {
        let normalized_value = normalized_value.into();
        let entity_id = domain::entity_id(entity_type.as_str(), &normalized_value);
        Self {
            entity_type,
            raw_value: normalized_value.clone(),
            normalized_value,
            confidence: 0.8,
            entity_id,
            source_chunk_id: None,
            source_stable_chunk_id: None,
            section_extraction_id: None,
            source_chunk_ids: Vec::new(),
            attributes: Map::new(),
        }
    }

    pub fn canonical_key(&self) -> String {
        domain::canonical_key(self.entity_type.as_str(), &self.normalized_value)
    }

    /// Normalize a free-form extraction entity. Accepts both the extraction
    /// format (`type`/`id`/`value`/`attributes`) and the mention format
    /// (`entity_type`/`normalized_value`/`raw_value`). Returns `None` when
    /// the type or value is missing.
    pub fn from_json(entity: &JsonValue) -> Option<Self> {
        let obj = entity.as_object()?;

        let entity_type = obj
            .get("type")
            .or_else(|| obj.get("entity_type"))
            .and_then(JsonValue::as_str)?;
        let normalized_value = obj
            .get("id")
            .or_else(|| obj.get("normalized_value"))
            .or_else(|| obj.get("value"))
            .and_then(JsonValue::as_str)?
            .to_string();
        if normalized_value.trim().is_empty() {
            return None;
        }
        let raw_value = obj
            .get("raw_value")
            .or_else(|| obj.get("value"))
            .or_else(|| obj.get("normalized_value"))
            .and_then(JsonValue::as_str)
            .unwrap_or(&normalized_value)
            .to_string();
        let confidence = obj
            .get("confidence")
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.8);

        let mut candidate = EntityCandidate::new(EntityType::parse(entity_type), normalized_value);
        candidate.raw_value = raw_value;
        candidate.confidence = confidence;

        // Preserve the rest of the payload; a nested attributes block merges
        // directly.
        const CONSUMED: [&str; 7] = [
            "type",
            "entity_type",
            "id",
            "normalized_value",
            "value",
            "raw_value",
            "confidence",
        ];
        for (key, value) in obj {
            if CONSUMED.contains(&key.as_str()) || value.is_null() {
                continue;
            }
            if key == "attributes" {
                if let Some(attrs) = value.as_object() {
                    for (k, v) in attrs {
                        if !v.is_null() {
                            candidate.attributes.insert(k.clone(), v.clone());
                        }
                    }
                }
                continue;
            }
            if key == "source_chunk_id" {
                candidate.source_chunk_id = value.as_str().and_then(|s| Uuid::parse_str(s).ok());
                continue;
            }
            if key == "source_stable_chunk_id" {
                candidate.source_stable_chunk_id = value.as_str().map(str::to_string);
                continue;
            }
            candidate.attributes.insert(key.clone(), value.clone());
        }

        // Honor a caller-supplied entity_id over the derived one.
        if let Some(given) = obj.get("entity_id").and_then(JsonValue::as_str) {
            candidate.entity_id = given.to_string();
            candidate.attributes.remove("entity_id");
        }
        Some(candidate)
    }

    /// Build a candidate from a persisted mention (the preferred,
    /// document-aligned source).
    pub fn from_mention(mention: &EntityMention) -> Self {
        let normalized_value = mention.normalized_value();
        let mut candidate =
            EntityCandidate::new(mention.entity_type.clone(), normalized_value);
        candidate.raw_value = mention.mention_text.clone();
        candidate.confidence = mention.confidence;
        candidate.source_chunk_id = mention.source_document_chunk_id;
        candidate.source_stable_chunk_id = mention.source_stable_chunk_id.clone();
        candidate.section_extraction_id = mention.section_extraction_id;
        if let Some(fields) = mention.extracted_fields.as_object() {
            for (key, value) in fields {
                if key != "normalized_value" && !value.is_null() {
                    candidate.attributes.insert(key.clone(), value.clone());
                }
            }
        }
        candidate
    }

    fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(JsonValue::as_str)
    }

    /// Best display name, used by the quality filter.
    pub fn display_name(&self) -> Option<String> {
        self.attr_str("coverage_name")
            .or_else(|| self.attr_str("exclusion_name"))
            .or_else(|| self.attr_str("name"))
            .or_else(|| self.attr_str("title"))
            .map(str::to_string)
            .or_else(|| Some(self.normalized_value.clone()).filter(|s| !s.is_empty()))
            .or_else(|| Some(self.raw_value.clone()).filter(|s| !s.is_empty()))
    }

    /// Human-readable mention text, preferred over the raw normalized value
    /// so evidence quotes read well.
    pub fn readable_mention_text(&self) -> String {
        self.attr_str("title")
            .or_else(|| self.attr_str("coverage_name"))
            .or_else(|| self.attr_str("exclusion_name"))
            .or_else(|| self.attr_str("name"))
            .or_else(|| self.attr_str("term"))
            .map(str::to_string)
            .unwrap_or_else(|| self.raw_value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_accepts_extraction_format() {
        let entity = json!({
            "type": "Coverage",
            "id": "General Liability",
            "confidence": 0.92,
            "attributes": {"coverage_type": "Liability"},
        });
        let candidate = EntityCandidate::from_json(&entity).unwrap();
        assert_eq!(candidate.entity_type, EntityType::Coverage);
        assert_eq!(candidate.normalized_value, "General Liability");
        assert_eq!(candidate.confidence, 0.92);
        assert_eq!(candidate.attributes["coverage_type"], "Liability");
        assert!(candidate.entity_id.starts_with("coverage_"));
    }

    #[test]
    fn from_json_accepts_mention_format() {
        let entity = json!({
            "entity_type": "Policy",
            "normalized_value": "POL-8888",
            "raw_value": "Policy Number POL-8888",
        });
        let candidate = EntityCandidate::from_json(&entity).unwrap();
        assert_eq!(candidate.entity_type, EntityType::Policy);
        assert_eq!(candidate.raw_value, "Policy Number POL-8888");
    }

    #[test]
    fn from_json_rejects_missing_value() {
        assert!(EntityCandidate::from_json(&json!({"type": "Coverage"})).is_none());
        assert!(EntityCandidate::from_json(&json!({"id": "x"})).is_none());
        assert!(EntityCandidate::from_json(&json!({"type": "Coverage", "id": "  "})).is_none());
    }

    #[test]
    fn readable_mention_text_prefers_titles() {
        let entity = json!({
            "type": "Exclusion",
            "id": "excl_flood",
            "title": "Flood Exclusion",
        });
        let candidate = EntityCandidate::from_json(&entity).unwrap();
        assert_eq!(candidate.readable_mention_text(), "Flood Exclusion");
    }

    #[test]
    fn given_entity_id_wins_over_derived() {
        let entity = json!({
            "type": "Coverage",
            "id": "GL",
            "entity_id": "temp_abc",
        });
        let candidate = EntityCandidate::from_json(&entity).unwrap();
        assert_eq!(candidate.entity_id, "temp_abc");
    }
}
