//! Entity synthesis from structured section data.
//!
//! When a section extraction carries no explicit `entities` list, candidates
//! are synthesized from the per-section structured lists (coverages,
//! exclusions, ...) so downstream resolution still has material to work with.

use serde_json::Value as JsonValue;
use tracing::debug;

use domain::EntityType;

use crate::candidate::EntityCandidate;

/// `(list key, name fields in preference order, entity type)` per section
/// list shape.
const LIST_SHAPES: &[(&str, &[&str], EntityType)] = &[
    ("coverages", &["coverage_name", "name"], EntityType::Coverage),
    ("exclusions", &["exclusion_name", "title", "name"], EntityType::Exclusion),
    ("conditions", &["title", "condition_name", "name"], EntityType::Condition),
    ("definitions", &["term", "defined_term"], EntityType::Definition),
    ("endorsements", &["endorsement_number", "title", "endorsement_title"], EntityType::Endorsement),
    ("locations", &["address", "location_number", "full_address"], EntityType::Location),
    ("claims", &["claim_number"], EntityType::Claim),
    ("vehicles", &["vin", "vehicle_id"], EntityType::Vehicle),
    ("drivers", &["full_name", "name", "driver_id"], EntityType::Driver),
];

/// Synthesize candidates from a section's structured lists.
pub fn synthesize_entities(extracted_fields: &JsonValue, section_type: &str) -> Vec<EntityCandidate> {
    let Some(fields) = extracted_fields.as_object() else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for (list_key, name_fields, entity_type) in LIST_SHAPES {
        let Some(items) = fields.get(*list_key).and_then(JsonValue::as_array) else {
            continue;
        };
        for item in items {
            let Some(obj) = item.as_object() else { continue };
            let Some(name) = name_fields
                .iter()
                .find_map(|f| obj.get(*f).and_then(JsonValue::as_str))
                .filter(|n| !n.trim().is_empty())
            else {
                continue;
            };

            let mut candidate = EntityCandidate::new(entity_type.clone(), name);
            candidate.confidence = obj
                .get("confidence")
                .and_then(JsonValue::as_f64)
                .unwrap_or(0.8);
            for (key, value) in obj {
                if key != "confidence" && !value.is_null() {
                    candidate.attributes.insert(key.clone(), value.clone());
                }
            }
            candidates.push(candidate);
        }
    }

    if !candidates.is_empty() {
        debug!(
            section_type,
            count = candidates.len(),
            "synthesized entities from structured section data"
        );
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn synthesizes_coverages_and_exclusions() {
        let fields = json!({
            "coverages": [
                {"coverage_name": "General Liability", "limit_amount": 1000000},
            ],
            "exclusions": [
                {"title": "Flood Exclusion"},
            ],
        });
        let candidates = synthesize_entities(&fields, "coverages");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].entity_type, EntityType::Coverage);
        assert_eq!(candidates[0].normalized_value, "General Liability");
        assert_eq!(candidates[0].attributes["limit_amount"], 1000000);
        assert_eq!(candidates[1].entity_type, EntityType::Exclusion);
    }

    #[test]
    fn skips_items_without_names() {
        let fields = json!({"coverages": [{"limit_amount": 5}]});
        assert!(synthesize_entities(&fields, "coverages").is_empty());
    }

    #[test]
    fn definitions_use_term() {
        let fields = json!({"definitions": [{"term": "Business Income", "definition": "..."}]});
        let candidates = synthesize_entities(&fields, "definitions");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].entity_type, EntityType::Definition);
        assert_eq!(candidates[0].normalized_value, "Business Income");
    }
}
