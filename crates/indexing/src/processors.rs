//! Section processors: how a section extraction's record expands into
//! indexable entities.
//!
//! List-based sections (coverages, exclusions, ...) index each child of the
//! section's list with a positional id suffix (`cov_0`, `excl_1`, ...);
//! everything else indexes the whole record under `section_root`.

use serde_json::Value as JsonValue;

/// One indexable entity pulled out of a section record.
#[derive(Debug, Clone)]
pub struct SectionEntity {
    pub data: JsonValue,
    /// Suffix of the embedding's entity id: `"{section_type}_{suffix}"`.
    pub suffix: String,
    pub entity_type: String,
}

/// `(section type, list key, entity type, id prefix)` registrations.
const LIST_PROCESSORS: &[(&str, &str, &str, &str)] = &[
    ("coverages", "coverages", "coverage", "cov"),
    ("loss_run", "claims", "claim", "claim"),
    ("schedule_of_values", "locations", "location", "loc"),
    ("endorsements", "endorsements", "endorsement", "end"),
    ("exclusions", "exclusions", "exclusion", "excl"),
    ("definitions", "definitions", "definition", "def"),
    ("vehicle_schedule", "vehicles", "vehicle", "veh"),
    ("driver_schedule", "drivers", "driver", "drv"),
];

/// Expand a section record into its indexable entities.
pub fn section_entities(section_type: &str, data: &JsonValue) -> Vec<SectionEntity> {
    let normalized = section_type.to_lowercase();
    if let Some((_, list_key, entity_type, id_prefix)) = LIST_PROCESSORS
        .iter()
        .find(|(section, _, _, _)| *section == normalized)
    {
        return data
            .get(*list_key)
            .and_then(JsonValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| SectionEntity {
                        data: item.clone(),
                        suffix: format!("{id_prefix}_{idx}"),
                        entity_type: entity_type.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
    }

    vec![SectionEntity {
        data: data.clone(),
        suffix: "section_root".to_string(),
        entity_type: "section".to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coverages_expand_per_item_with_positional_suffixes() {
        let data = json!({
            "coverages": [
                {"coverage_name": "Building"},
                {"coverage_name": "Business Income"},
            ],
        });
        let entities = section_entities("coverages", &data);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].suffix, "cov_0");
        assert_eq!(entities[1].suffix, "cov_1");
        assert_eq!(entities[0].entity_type, "coverage");
        assert_eq!(entities[1].data["coverage_name"], "Business Income");
    }

    #[test]
    fn declarations_index_as_single_record() {
        let data = json!({"policy_number": "POL-1"});
        let entities = section_entities("declarations", &data);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].suffix, "section_root");
        assert_eq!(entities[0].entity_type, "section");
    }

    #[test]
    fn missing_list_yields_no_entities() {
        let data = json!({"unrelated": true});
        assert!(section_entities("exclusions", &data).is_empty());
    }

    #[test]
    fn loss_run_uses_claims_list() {
        let data = json!({"claims": [{"claim_number": "CLM-1"}]});
        let entities = section_entities("loss_run", &data);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].suffix, "claim_0");
        assert_eq!(entities[0].entity_type, "claim");
    }
}
