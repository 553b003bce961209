//! Fixed output schemas for section extraction.

use serde_json::{Map, Value as JsonValue};

/// Known fields per section type. Anything else the model invents is moved
/// under `additional_data` rather than dropped.
pub fn known_fields(section_type: &str) -> &'static [&'static str] {
    match section_type {
        "coverages" => &[
            "coverage_name",
            "coverage_type",
            "limit_amount",
            "deductible_amount",
            "premium_amount",
            "description",
            "sub_limits",
            "exclusions",
            "conditions",
            "per_occurrence",
            "aggregate",
            "confidence",
        ],
        "conditions" => &[
            "condition_type",
            "title",
            "description",
            "applies_to",
            "requirements",
            "consequences",
            "reference",
            "confidence",
        ],
        "exclusions" => &[
            "exclusion_type",
            "title",
            "description",
            "applies_to",
            "exceptions",
            "reference",
            "confidence",
        ],
        _ => &[],
    }
}

/// Validate one section's item list: keep known fields at top level, fold the
/// rest into `additional_data`, drop non-object entries. An empty known-field
/// list (unmodeled section) passes items through untouched.
pub fn validate_section_items(section_type: &str, items: &[JsonValue]) -> Vec<JsonValue> {
    let fields = known_fields(section_type);
    if fields.is_empty() {
        return items.iter().filter(|i| i.is_object()).cloned().collect();
    }

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let mut known = Map::new();
            let mut additional = Map::new();
            for (key, value) in obj {
                if fields.contains(&key.as_str()) {
                    known.insert(key.clone(), value.clone());
                } else {
                    additional.insert(key.clone(), value.clone());
                }
            }
            if !additional.is_empty() {
                known.insert("additional_data".to_string(), JsonValue::Object(additional));
            }
            Some(JsonValue::Object(known))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_fields_stay_top_level() {
        let items = vec![json!({
            "coverage_name": "Building",
            "limit_amount": 5_000_000,
        })];
        let validated = validate_section_items("coverages", &items);
        assert_eq!(validated[0]["coverage_name"], "Building");
        assert!(validated[0].get("additional_data").is_none());
    }

    #[test]
    fn unknown_fields_move_to_additional_data() {
        let items = vec![json!({
            "coverage_name": "Building",
            "windstorm_tier": "coastal",
        })];
        let validated = validate_section_items("coverages", &items);
        assert_eq!(validated[0]["additional_data"]["windstorm_tier"], "coastal");
        assert!(validated[0].get("windstorm_tier").is_none());
    }

    #[test]
    fn non_objects_are_dropped() {
        let items = vec![json!("stray string"), json!({"title": "Flood"})];
        let validated = validate_section_items("exclusions", &items);
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0]["title"], "Flood");
    }

    #[test]
    fn unmodeled_sections_pass_through() {
        let items = vec![json!({"anything": true})];
        let validated = validate_section_items("declarations", &items);
        assert_eq!(validated, items);
    }
}
