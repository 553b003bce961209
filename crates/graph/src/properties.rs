//! Type-keyed property mapping from canonical entity attributes to graph
//! node properties. Only schema-approved keys are persisted; nulls are
//! removed.

use serde_json::Value as JsonValue;

use domain::{CanonicalEntity, EntityType};

/// Graph node label for an entity type: the type name with anything
/// non-alphanumeric stripped, `Entity` when nothing survives.
pub fn node_label(entity_type: &EntityType) -> String {
    let label: String = entity_type
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if label.is_empty() {
        "Entity".to_string()
    } else {
        label
    }
}

/// Approved property keys per label; values come from `attributes` with the
/// listed aliases tried in order.
fn schema_keys(entity_type: &EntityType) -> &'static [(&'static str, &'static [&'static str])] {
    match entity_type {
        EntityType::Policy => &[
            ("policy_number", &["policy_number"]),
            ("policy_type", &["policy_type"]),
            ("policy_form", &["policy_form"]),
            ("status", &["status"]),
            ("effective_date", &["effective_date"]),
            ("expiration_date", &["expiration_date"]),
            ("policy_term", &["policy_term"]),
            ("total_premium", &["total_premium"]),
            ("base_premium", &["base_premium"]),
            ("rate_per_100", &["rate_per_100"]),
        ],
        EntityType::Organization => &[
            ("name", &["name"]),
            ("role", &["role"]),
            ("address", &["address"]),
        ],
        EntityType::Coverage => &[
            ("name", &["name", "coverage_name"]),
            ("coverage_type", &["coverage_type"]),
            ("coverage_part", &["coverage_part"]),
            ("description", &["description"]),
            ("per_occurrence_limit", &["per_occurrence_limit", "limit_occurrence"]),
            ("aggregate_limit", &["aggregate_limit", "limit_aggregate"]),
            ("deductible_amount", &["deductible", "deductible_amount"]),
            ("deductible_type", &["deductible_type"]),
            ("waiting_period", &["waiting_period"]),
            ("coinsurance", &["coinsurance"]),
            ("valuation_method", &["valuation_method"]),
            ("included", &["included"]),
        ],
        EntityType::Condition => &[
            ("title", &["title", "name"]),
            ("condition_type", &["condition_type"]),
            ("description", &["description"]),
            ("applies_to", &["applies_to"]),
            ("requirements", &["requirements"]),
            ("consequences", &["consequences"]),
        ],
        EntityType::Exclusion => &[
            ("title", &["title", "exclusion_name", "name"]),
            ("exclusion_type", &["exclusion_type"]),
            ("description", &["description"]),
            ("applies_to", &["applies_to"]),
            ("exceptions", &["exceptions"]),
        ],
        EntityType::Endorsement => &[
            ("endorsement_number", &["form_number", "endorsement_number"]),
            ("title", &["title", "name"]),
            ("description", &["description"]),
            ("effective_date", &["effective_date"]),
        ],
        EntityType::Location => &[
            ("location_id", &["location_id"]),
            ("address", &["address"]),
            ("construction_type", &["construction_type"]),
            ("occupancy", &["occupancy"]),
            ("year_built", &["year_built"]),
            ("number_of_stories", &["number_of_stories"]),
            ("sprinklered", &["sprinklered"]),
            ("building_value", &["building_value"]),
            ("contents_value", &["contents_value"]),
            ("bi_value", &["bi_value"]),
            ("tiv", &["tiv"]),
            ("flood_zone", &["flood_zone"]),
        ],
        EntityType::Claim => &[
            ("claim_number", &["claim_number"]),
            ("cause_of_loss", &["cause_of_loss"]),
            ("status", &["status"]),
            ("loss_date", &["loss_date"]),
            ("report_date", &["report_date", "reported_date"]),
            ("paid_amount", &["paid_amount"]),
            ("incurred_amount", &["incurred_amount"]),
            ("reserve_amount", &["reserve_amount"]),
            ("description", &["description"]),
        ],
        EntityType::Definition => &[
            ("term", &["term"]),
            ("definition_text", &["definition_text", "definition"]),
        ],
        EntityType::Vehicle => &[
            ("vin", &["vin"]),
            ("year", &["year"]),
            ("make", &["make"]),
            ("model", &["model"]),
        ],
        EntityType::Driver => &[
            ("name", &["name"]),
            ("date_of_birth", &["date_of_birth"]),
            ("license_number", &["license_number"]),
            ("violations", &["violations"]),
            ("accidents", &["accidents"]),
        ],
        EntityType::Other(_) => &[
            ("name", &["name", "title", "term"]),
            ("description", &["description"]),
        ],
    }
}

/// Map a canonical entity's attributes into its node properties. The `id`
/// and `workflow_id` identity properties are added by the projector.
pub fn map_entity_properties(entity: &CanonicalEntity) -> Vec<(String, JsonValue)> {
    let mut props = Vec::new();
    let attrs = match entity.attributes.as_object() {
        Some(attrs) => attrs,
        None => return props,
    };

    // Every node keeps its normalized value for display.
    if let Some(value) = attrs.get("normalized_value").filter(|v| !v.is_null()) {
        props.push(("normalized_value".to_string(), value.clone()));
    }

    for (prop, aliases) in schema_keys(&entity.entity_type) {
        let value = aliases
            .iter()
            .find_map(|alias| attrs.get(*alias))
            .filter(|v| !v.is_null());
        if let Some(value) = value {
            props.push((prop.to_string(), value.clone()));
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn entity(entity_type: EntityType, attributes: JsonValue) -> CanonicalEntity {
        CanonicalEntity {
            id: Uuid::new_v4(),
            entity_type,
            canonical_key: "abc123".into(),
            attributes,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn labels_are_sanitized() {
        assert_eq!(node_label(&EntityType::Policy), "Policy");
        assert_eq!(node_label(&EntityType::Other("Peril Zone".into())), "PerilZone");
        assert_eq!(node_label(&EntityType::Other("---".into())), "Entity");
    }

    #[test]
    fn coverage_mapping_uses_aliases_and_drops_nulls() {
        let e = entity(
            EntityType::Coverage,
            json!({
                "normalized_value": "General Liability",
                "coverage_name": "General Liability",
                "limit_occurrence": 1000000,
                "deductible": 5000,
                "description": null,
                "unapproved_key": "dropped",
            }),
        );
        let props = map_entity_properties(&e);
        let keys: Vec<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"name"));
        assert!(keys.contains(&"per_occurrence_limit"));
        assert!(keys.contains(&"deductible_amount"));
        assert!(!keys.contains(&"description"));
        assert!(!keys.contains(&"unapproved_key"));
    }

    #[test]
    fn organization_mapping() {
        let e = entity(
            EntityType::Organization,
            json!({"normalized_value": "Acme Insurance Co", "name": "Acme Insurance Co", "role": "carrier"}),
        );
        let props = map_entity_properties(&e);
        assert!(props.iter().any(|(k, v)| k == "role" && v == "carrier"));
    }
}
