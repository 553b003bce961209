//! Semantic section batching for relationship extraction.
//!
//! One LLM call over a whole policy truncates output and a chunk-by-chunk
//! call sees only one side of most relationships. The fix is to group
//! sections that commonly share relationships and process each group in one
//! call, routing table data to the batches that can use it.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::info;

use domain::RelationshipType;

/// Priority applied to sections no pairing covers.
pub const FALLBACK_PRIORITY: u8 = 99;

/// Static pairing of sections that commonly share relationships.
#[derive(Debug, Clone, Copy)]
pub struct SectionPairing {
    pub name: &'static str,
    pub description: &'static str,
    pub sections: &'static [&'static str],
    pub expected_rels: &'static [RelationshipType],
    pub priority: u8,
    pub include_sov: bool,
    pub include_loss_runs: bool,
    pub table_types: &'static [&'static str],
}

/// Fixed, priority-ordered pairing table.
pub const SECTION_PAIRINGS: [SectionPairing; 8] = [
    SectionPairing {
        name: "policy_identity",
        description: "Policy identity: carrier, insured, and broker",
        sections: &["declarations"],
        expected_rels: &[
            RelationshipType::IssuedBy,
            RelationshipType::HasInsured,
            RelationshipType::BrokeredBy,
        ],
        priority: 1,
        include_sov: false,
        include_loss_runs: false,
        table_types: &["premium_schedule"],
    },
    SectionPairing {
        name: "policy_coverage",
        description: "Policy to coverage links",
        sections: &["declarations", "coverages"],
        expected_rels: &[RelationshipType::HasCoverage],
        priority: 2,
        include_sov: false,
        include_loss_runs: false,
        table_types: &["coverage_schedule", "premium_schedule"],
    },
    SectionPairing {
        name: "coverage_condition",
        description: "Coverages subject to conditions",
        sections: &["coverages", "conditions"],
        expected_rels: &[RelationshipType::SubjectTo],
        priority: 3,
        include_sov: false,
        include_loss_runs: false,
        table_types: &[],
    },
    SectionPairing {
        name: "coverage_exclusion",
        description: "Coverages limited by exclusions",
        sections: &["coverages", "exclusions"],
        expected_rels: &[RelationshipType::Excludes],
        priority: 4,
        include_sov: false,
        include_loss_runs: false,
        table_types: &[],
    },
    SectionPairing {
        name: "policy_location",
        description: "Policy to scheduled locations",
        sections: &["declarations", "sov"],
        expected_rels: &[RelationshipType::HasLocation],
        priority: 5,
        include_sov: true,
        include_loss_runs: false,
        table_types: &["property_sov"],
    },
    SectionPairing {
        name: "policy_claim",
        description: "Policy to historical claims",
        sections: &["declarations", "loss_run"],
        expected_rels: &[RelationshipType::HasClaim],
        priority: 6,
        include_sov: false,
        include_loss_runs: true,
        table_types: &["loss_run"],
    },
    SectionPairing {
        name: "coverage_endorsement",
        description: "Coverages modified by endorsements",
        sections: &["coverages", "endorsements"],
        expected_rels: &[RelationshipType::ModifiedBy],
        priority: 7,
        include_sov: false,
        include_loss_runs: false,
        table_types: &[],
    },
    SectionPairing {
        name: "coverage_definition",
        description: "Coverage terms defined in definitions",
        sections: &["coverages", "definitions"],
        expected_rels: &[RelationshipType::DefinedIn],
        priority: 8,
        include_sov: false,
        include_loss_runs: false,
        table_types: &[],
    },
];

/// One chunk as seen inside a batch prompt.
#[derive(Debug, Clone)]
pub struct BatchChunk {
    pub chunk_id: String,
    pub stable_chunk_id: String,
    pub page_number: i32,
    pub section_type: String,
    pub text: String,
    pub token_count: i32,
}

/// One semantic batch ready for an LLM call.
#[derive(Debug, Clone)]
pub struct SemanticBatch {
    pub name: String,
    pub description: String,
    pub sections: Vec<String>,
    pub expected_rels: Vec<RelationshipType>,
    pub priority: u8,
    pub chunks: Vec<BatchChunk>,
    pub sov_items_json: JsonValue,
    pub loss_run_claims_json: JsonValue,
    pub document_tables_json: JsonValue,
}

impl SemanticBatch {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_tokens(&self) -> i64 {
        self.chunks.iter().map(|c| c.token_count as i64).sum()
    }
}

/// Partition sections into semantic batches. Sections appearing in several
/// pairings join each of them; sections no pairing covers fall into
/// single-section fallback batches at priority 99.
pub fn partition_sections(
    section_chunks: &BTreeMap<String, Vec<BatchChunk>>,
    sov_items: &JsonValue,
    loss_run_claims: &JsonValue,
    document_tables: &[JsonValue],
) -> Vec<SemanticBatch> {
    let mut batches = Vec::new();
    let mut covered: std::collections::HashSet<String> = std::collections::HashSet::new();

    let mut pairings = SECTION_PAIRINGS;
    pairings.sort_by_key(|p| p.priority);

    for pairing in pairings {
        let present: Vec<String> = pairing
            .sections
            .iter()
            .filter(|s| section_chunks.contains_key(**s))
            .map(|s| s.to_string())
            .collect();
        if present.is_empty() {
            continue;
        }

        let mut chunks = Vec::new();
        for section in &present {
            chunks.extend(section_chunks[section].iter().cloned());
            covered.insert(section.clone());
        }

        let routed_tables: Vec<JsonValue> = document_tables
            .iter()
            .filter(|t| {
                t.get("table_type")
                    .and_then(JsonValue::as_str)
                    .map(|ty| pairing.table_types.contains(&ty))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        batches.push(SemanticBatch {
            name: pairing.name.to_string(),
            description: pairing.description.to_string(),
            sections: present,
            expected_rels: pairing.expected_rels.to_vec(),
            priority: pairing.priority,
            chunks,
            sov_items_json: if pairing.include_sov {
                sov_items.clone()
            } else {
                JsonValue::Array(Vec::new())
            },
            loss_run_claims_json: if pairing.include_loss_runs {
                loss_run_claims.clone()
            } else {
                JsonValue::Array(Vec::new())
            },
            document_tables_json: JsonValue::Array(routed_tables),
        });
    }

    // Fallback batches for sections no pairing touched.
    for (section, chunks) in section_chunks {
        if covered.contains(section) {
            continue;
        }
        batches.push(SemanticBatch {
            name: format!("uncovered_{section}"),
            description: format!("Uncovered section: {section}"),
            sections: vec![section.clone()],
            expected_rels: Vec::new(),
            priority: FALLBACK_PRIORITY,
            chunks: chunks.clone(),
            sov_items_json: JsonValue::Array(Vec::new()),
            loss_run_claims_json: JsonValue::Array(Vec::new()),
            document_tables_json: JsonValue::Array(Vec::new()),
        });
    }

    info!(
        total_sections = section_chunks.len(),
        batches = batches.len(),
        batch_names = ?batches.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
        "partitioned sections into semantic batches"
    );
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(section: &str, text: &str) -> BatchChunk {
        BatchChunk {
            chunk_id: "11111111-2222-3333-4444-555555555555".into(),
            stable_chunk_id: format!("doc_x_p1_c0_{section}"),
            page_number: 1,
            section_type: section.to_string(),
            text: text.to_string(),
            token_count: 10,
        }
    }

    fn sections(names: &[&str]) -> BTreeMap<String, Vec<BatchChunk>> {
        names
            .iter()
            .map(|n| (n.to_string(), vec![chunk(n, "text")]))
            .collect()
    }

    #[test]
    fn declarations_and_coverages_form_expected_batches() {
        let section_chunks = sections(&["declarations", "coverages"]);
        let empty = JsonValue::Array(Vec::new());
        let batches = partition_sections(&section_chunks, &empty, &empty, &[]);

        let names: Vec<&str> = batches.iter().map(|b| b.name.as_str()).collect();
        assert!(names.contains(&"policy_identity"));
        assert!(names.contains(&"policy_coverage"));
        // The policy_coverage batch sees both sections.
        let pc = batches.iter().find(|b| b.name == "policy_coverage").unwrap();
        assert_eq!(pc.sections, vec!["declarations", "coverages"]);
        assert_eq!(pc.chunk_count(), 2);
    }

    #[test]
    fn missing_sections_skip_their_pairings() {
        let section_chunks = sections(&["coverages"]);
        let empty = JsonValue::Array(Vec::new());
        let batches = partition_sections(&section_chunks, &empty, &empty, &[]);
        assert!(!batches.iter().any(|b| b.name == "policy_identity"));
        assert!(batches.iter().any(|b| b.name == "policy_coverage"));
    }

    #[test]
    fn uncovered_sections_get_fallback_batches() {
        let section_chunks = sections(&["vehicle_schedule"]);
        let empty = JsonValue::Array(Vec::new());
        let batches = partition_sections(&section_chunks, &empty, &empty, &[]);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].name, "uncovered_vehicle_schedule");
        assert_eq!(batches[0].priority, FALLBACK_PRIORITY);
    }

    #[test]
    fn sov_routes_only_to_location_batch() {
        let section_chunks = sections(&["declarations", "sov"]);
        let sov = serde_json::json!([{"sov_id": "sov-1"}]);
        let empty = JsonValue::Array(Vec::new());
        let batches = partition_sections(&section_chunks, &sov, &empty, &[]);

        let location = batches.iter().find(|b| b.name == "policy_location").unwrap();
        assert_eq!(location.sov_items_json, sov);
        let identity = batches.iter().find(|b| b.name == "policy_identity").unwrap();
        assert_eq!(identity.sov_items_json, JsonValue::Array(Vec::new()));
    }

    #[test]
    fn tables_route_by_table_type() {
        let section_chunks = sections(&["declarations", "coverages"]);
        let empty = JsonValue::Array(Vec::new());
        let tables = vec![
            serde_json::json!({"table_id": "tbl-1", "table_type": "premium_schedule"}),
            serde_json::json!({"table_id": "tbl-2", "table_type": "property_sov"}),
        ];
        let batches = partition_sections(&section_chunks, &empty, &empty, &tables);

        let identity = batches.iter().find(|b| b.name == "policy_identity").unwrap();
        let routed = identity.document_tables_json.as_array().unwrap();
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0]["table_id"], "tbl-1");
    }

    #[test]
    fn batches_are_priority_ordered() {
        let section_chunks = sections(&["declarations", "coverages", "conditions", "definitions"]);
        let empty = JsonValue::Array(Vec::new());
        let batches = partition_sections(&section_chunks, &empty, &empty, &[]);
        let priorities: Vec<u8> = batches.iter().map(|b| b.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }
}
