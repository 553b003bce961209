//! Query understanding: classify intent, expand queries, extract entities,
//! and derive filters.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query intent. `General` short-circuits the whole pipeline with a static
/// conversational reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryIntent {
    Qa,
    Analysis,
    Audit,
    General,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Qa => "QA",
            QueryIntent::Analysis => "ANALYSIS",
            QueryIntent::Audit => "AUDIT",
            QueryIntent::General => "GENERAL",
        }
    }

    /// Graph traversal depth per intent: QA=1, ANALYSIS=2, AUDIT=3.
    pub fn traversal_depth(&self) -> u32 {
        match self {
            QueryIntent::Qa => 1,
            QueryIntent::Analysis => 2,
            QueryIntent::Audit => 3,
            QueryIntent::General => 0,
        }
    }
}

/// Entities pulled out of the query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedQueryEntities {
    pub policy_numbers: Vec<String>,
    pub coverage_types: Vec<String>,
    pub organizations: Vec<String>,
}

/// The retrieval plan Stage 1 hands to the rest of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub intent: QueryIntent,
    pub traversal_depth: u32,
    pub expanded_queries: Vec<String>,
    pub extracted_entities: ExtractedQueryEntities,
    pub section_type_filters: Vec<String>,
    pub entity_type_filters: Vec<String>,
    pub target_document_ids: Option<Vec<Uuid>>,
}

static POLICY_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2,}[A-Z0-9]*-\d[\dA-Z-]*\b").expect("policy number pattern"));

const COVERAGE_TERMS: [&str; 10] = [
    "general liability",
    "business income",
    "property",
    "auto liability",
    "workers compensation",
    "umbrella",
    "cyber",
    "flood",
    "earthquake",
    "equipment breakdown",
];

const GENERAL_MARKERS: [&str; 8] = [
    "hello", "hi there", "thanks", "thank you", "who are you", "what can you do", "help me use",
    "good morning",
];

const AUDIT_MARKERS: [&str; 7] = [
    "audit", "compliance", "verify", "gaps", "missing", "inconsistent", "discrepanc",
];

const ANALYSIS_MARKERS: [&str; 8] = [
    "compare", "analyz", "analys", "summariz", "trend", "impact", "why", "how does",
];

/// Stage 1: build a [`QueryPlan`] from the raw query.
pub fn understand_query(query: &str, target_document_ids: Option<Vec<Uuid>>) -> QueryPlan {
    let lower = query.to_lowercase();
    let intent = classify_intent(&lower);

    let extracted_entities = extract_entities(query, &lower);
    let section_type_filters = derive_section_filters(&lower);
    let entity_type_filters = derive_entity_filters(&lower);
    let expanded_queries = expand_queries(query, &extracted_entities, &section_type_filters);

    QueryPlan {
        intent,
        traversal_depth: intent.traversal_depth(),
        expanded_queries,
        extracted_entities,
        section_type_filters,
        entity_type_filters,
        target_document_ids,
    }
}

fn classify_intent(lower: &str) -> QueryIntent {
    let word_count = lower.split_whitespace().count();
    if GENERAL_MARKERS.iter().any(|m| lower.contains(m)) && word_count <= 8 {
        return QueryIntent::General;
    }
    if AUDIT_MARKERS.iter().any(|m| lower.contains(m)) {
        return QueryIntent::Audit;
    }
    if ANALYSIS_MARKERS.iter().any(|m| lower.contains(m)) {
        return QueryIntent::Analysis;
    }
    QueryIntent::Qa
}

fn extract_entities(query: &str, lower: &str) -> ExtractedQueryEntities {
    let policy_numbers = POLICY_NUMBER
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .collect();
    let coverage_types = COVERAGE_TERMS
        .iter()
        .filter(|t| lower.contains(*t))
        .map(|t| t.to_string())
        .collect();
    // Capitalized multi-word runs read as organization names.
    let organizations = organization_candidates(query);
    ExtractedQueryEntities {
        policy_numbers,
        coverage_types,
        organizations,
    }
}

fn organization_candidates(query: &str) -> Vec<String> {
    let mut orgs = Vec::new();
    let words: Vec<&str> = query.split_whitespace().collect();
    let mut run: Vec<&str> = Vec::new();
    for word in words.iter().chain(std::iter::once(&"")) {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric());
        let capitalized = cleaned
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
            && cleaned.chars().any(|c| c.is_lowercase());
        if capitalized {
            run.push(cleaned);
        } else {
            if run.len() >= 2 {
                orgs.push(run.join(" "));
            }
            run.clear();
        }
    }
    orgs
}

fn derive_section_filters(lower: &str) -> Vec<String> {
    let mut filters = Vec::new();
    let table: [(&str, &[&str]); 8] = [
        ("declarations", &["policy number", "named insured", "carrier", "premium", "policy period"]),
        ("coverages", &["coverage", "limit", "deductible", "covered"]),
        ("exclusions", &["exclusion", "excluded", "not covered"]),
        ("conditions", &["condition", "requirement", "duties"]),
        ("endorsements", &["endorsement", "amendment"]),
        ("schedule_of_values", &["location", "building", "tiv", "sov"]),
        ("loss_run", &["claim", "loss history", "losses", "incurred"]),
        ("definitions", &["definition", "defined", "meaning of"]),
    ];
    for (section, markers) in table {
        if markers.iter().any(|m| lower.contains(m)) {
            filters.push(section.to_string());
        }
    }
    filters
}

fn derive_entity_filters(lower: &str) -> Vec<String> {
    let mut filters = Vec::new();
    let table: [(&str, &[&str]); 6] = [
        ("coverage", &["coverage", "limit", "covered"]),
        ("exclusion", &["exclusion", "excluded"]),
        ("claim", &["claim", "loss"]),
        ("location", &["location", "building", "address"]),
        ("endorsement", &["endorsement"]),
        ("definition", &["definition", "defined"]),
    ];
    for (entity_type, markers) in table {
        if markers.iter().any(|m| lower.contains(m)) {
            filters.push(entity_type.to_string());
        }
    }
    filters
}

/// The original query, plus one variant per extracted entity and one per
/// matched section, deduplicated in order.
fn expand_queries(
    query: &str,
    entities: &ExtractedQueryEntities,
    sections: &[String],
) -> Vec<String> {
    let mut expanded = vec![query.to_string()];
    for policy in &entities.policy_numbers {
        expanded.push(format!("policy {policy}"));
    }
    for coverage in &entities.coverage_types {
        expanded.push(format!("{coverage} coverage limits and terms"));
    }
    for org in &entities.organizations {
        expanded.push(format!("{org} role in policy"));
    }
    for section in sections.iter().take(2) {
        expanded.push(format!("{} {}", section.replace('_', " "), query));
    }
    let mut deduped = Vec::new();
    for q in expanded {
        if !deduped.contains(&q) {
            deduped.push(q);
        }
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_is_the_default_intent() {
        let plan = understand_query("Who is the carrier?", None);
        assert_eq!(plan.intent, QueryIntent::Qa);
        assert_eq!(plan.traversal_depth, 1);
    }

    #[test]
    fn audit_and_analysis_markers() {
        assert_eq!(
            understand_query("Audit the policy for compliance gaps", None).intent,
            QueryIntent::Audit
        );
        assert_eq!(
            understand_query("Compare the coverage limits across locations", None).intent,
            QueryIntent::Analysis
        );
        assert_eq!(understand_query("Audit it", None).traversal_depth, 3);
    }

    #[test]
    fn general_short_queries_short_circuit() {
        let plan = understand_query("hello, what can you do?", None);
        assert_eq!(plan.intent, QueryIntent::General);
        assert_eq!(plan.traversal_depth, 0);
    }

    #[test]
    fn extracts_policy_numbers_and_coverages() {
        let plan = understand_query("What are the limits for POL-8888 general liability?", None);
        assert_eq!(plan.extracted_entities.policy_numbers, vec!["POL-8888"]);
        assert_eq!(
            plan.extracted_entities.coverage_types,
            vec!["general liability"]
        );
    }

    #[test]
    fn extracts_organization_runs() {
        let plan = understand_query("Is Acme Insurance the carrier?", None);
        assert!(plan
            .extracted_entities
            .organizations
            .contains(&"Acme Insurance".to_string()));
    }

    #[test]
    fn expansion_includes_original_first_and_dedupes() {
        let plan = understand_query("general liability limits", None);
        assert_eq!(plan.expanded_queries[0], "general liability limits");
        assert!(plan.expanded_queries.len() > 1);
        let mut unique = plan.expanded_queries.clone();
        unique.dedup();
        assert_eq!(unique.len(), plan.expanded_queries.len());
    }

    #[test]
    fn filters_derive_from_markers() {
        let plan = understand_query("Which exclusions apply to the building coverage?", None);
        assert!(plan.section_type_filters.contains(&"exclusions".to_string()));
        assert!(plan.section_type_filters.contains(&"coverages".to_string()));
        assert!(plan.entity_type_filters.contains(&"exclusion".to_string()));
    }
}
