//! Stage 4: merge vector and graph results and pack a hierarchical context.
//!
//! The highest-scoring results get full-text slots until the token budget
//! runs out; the rest are carried as one-line summaries. The Markdown
//! rendering is what the response model actually sees.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use uuid::Uuid;

use crate::expansion::GraphResult;
use crate::vector::VectorSearchResult;

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Summary length for results that miss a full-text slot.
const SUMMARY_CHARS: usize = 200;

/// Score assigned to graph results relative to vector scores (graph hits are
/// context, not direct matches).
const GRAPH_RESULT_SCORE: f64 = 0.5;

/// Source of one merged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOrigin {
    Vector,
    Graph,
}

/// One result after merging the vector and graph stages.
#[derive(Debug, Clone)]
pub struct MergedResult {
    pub origin: ResultOrigin,
    pub document_id: Option<Uuid>,
    pub document_name: Option<String>,
    pub section_type: Option<String>,
    pub source_id: String,
    pub content: String,
    pub score: f64,
    pub page_numbers: Vec<i32>,
}

/// Hierarchical context bounded by a token budget.
#[derive(Debug, Clone)]
pub struct ContextPayload {
    pub full_text_results: Vec<MergedResult>,
    pub summary_results: Vec<MergedResult>,
    pub token_count: usize,
    pub section_token_counts: BTreeMap<String, usize>,
}

/// Merge vector and graph results into one scored list (vector first at
/// equal score; duplicate source ids collapse to the higher score).
pub fn merge_results(
    vector_results: &[VectorSearchResult],
    graph_results: &[GraphResult],
) -> Vec<MergedResult> {
    let mut merged: Vec<MergedResult> = Vec::new();

    for result in vector_results {
        merged.push(MergedResult {
            origin: ResultOrigin::Vector,
            document_id: Some(result.document_id),
            document_name: Some(result.document_name.clone()),
            section_type: Some(result.section_type.clone()),
            source_id: result.entity_id.clone(),
            content: result.content.clone(),
            score: result.final_score,
            page_numbers: result.page_numbers.clone(),
        });
    }

    for result in graph_results {
        let chain = result
            .relationship_chain
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        let value = result.entity.normalized_value().unwrap_or("unnamed");
        let description = result
            .entity
            .attribute_str("description")
            .unwrap_or_default();
        let content = format!(
            "{} {value} (via {chain}){}{}",
            result.entity.entity_type,
            if description.is_empty() { "" } else { ": " },
            description,
        );
        let depth_penalty = 0.1 * (result.depth.saturating_sub(1)) as f64;
        merged.push(MergedResult {
            origin: ResultOrigin::Graph,
            document_id: None,
            document_name: None,
            section_type: None,
            source_id: result.entity.canonical_key.clone(),
            content,
            score: (GRAPH_RESULT_SCORE - depth_penalty).max(0.1),
            page_numbers: Vec::new(),
        });
    }

    // Collapse duplicates on source id, keeping the best score.
    let mut deduped: Vec<MergedResult> = Vec::new();
    for result in merged {
        match deduped.iter_mut().find(|r| r.source_id == result.source_id) {
            Some(existing) => {
                if result.score > existing.score {
                    *existing = result;
                }
            }
            None => deduped.push(result),
        }
    }
    deduped.sort_by(|a, b| b.score.total_cmp(&a.score));
    deduped
}

/// Pack merged results into the token budget: full text for the top of the
/// ranking while it fits, summaries for the rest.
pub fn build_context(results: Vec<MergedResult>, max_tokens: usize) -> ContextPayload {
    let mut full_text_results = Vec::new();
    let mut summary_results = Vec::new();
    let mut token_count = 0usize;
    let mut section_token_counts: BTreeMap<String, usize> = BTreeMap::new();

    for result in results {
        let full_tokens = estimate_tokens(&result.content);
        if token_count + full_tokens <= max_tokens {
            token_count += full_tokens;
            let section = result
                .section_type
                .clone()
                .unwrap_or_else(|| "graph".to_string());
            *section_token_counts.entry(section).or_default() += full_tokens;
            full_text_results.push(result);
        } else {
            let mut summarized = result;
            summarized.content = summarize(&summarized.content);
            let summary_tokens = estimate_tokens(&summarized.content);
            if token_count + summary_tokens > max_tokens {
                continue;
            }
            token_count += summary_tokens;
            let section = summarized
                .section_type
                .clone()
                .unwrap_or_else(|| "graph".to_string());
            *section_token_counts.entry(section).or_default() += summary_tokens;
            summary_results.push(summarized);
        }
    }

    ContextPayload {
        full_text_results,
        summary_results,
        token_count,
        section_token_counts,
    }
}

fn summarize(content: &str) -> String {
    let flat = content.replace('\n', " | ");
    if flat.chars().count() <= SUMMARY_CHARS {
        flat
    } else {
        let truncated: String = flat.chars().take(SUMMARY_CHARS).collect();
        format!("{truncated}...")
    }
}

/// Markdown rendering handed to the response model.
pub fn format_context_markdown(payload: &ContextPayload) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Retrieved Context\n");

    if !payload.full_text_results.is_empty() {
        let _ = writeln!(out, "## Primary Sources\n");
        for (i, result) in payload.full_text_results.iter().enumerate() {
            let label = source_label(result);
            let _ = writeln!(out, "### Source {} {label}\n", i + 1);
            let _ = writeln!(out, "{}\n", result.content);
        }
    }
    if !payload.summary_results.is_empty() {
        let _ = writeln!(out, "## Additional Context (summaries)\n");
        for result in &payload.summary_results {
            let label = source_label(result);
            let _ = writeln!(out, "- {label} {}", result.content);
        }
    }
    out
}

fn source_label(result: &MergedResult) -> String {
    match (&result.document_name, &result.section_type) {
        (Some(doc), Some(section)) => {
            if result.page_numbers.is_empty() {
                format!("[{doc} | {section}]")
            } else {
                format!(
                    "[{doc} | {section} | pages {}]",
                    result
                        .page_numbers
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(",")
                )
            }
        }
        _ => "[knowledge graph]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_result(entity_id: &str, score: f64, content: &str) -> MergedResult {
        MergedResult {
            origin: ResultOrigin::Vector,
            document_id: Some(Uuid::nil()),
            document_name: Some("policy.pdf".into()),
            section_type: Some("coverages".into()),
            source_id: entity_id.to_string(),
            content: content.to_string(),
            score,
            page_numbers: vec![2],
        }
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn context_splits_full_text_and_summaries_by_budget() {
        let results = vec![
            vector_result("a", 0.9, &"x".repeat(400)),  // 100 tokens
            vector_result("b", 0.8, &"y".repeat(400)),  // 100 tokens
            vector_result("c", 0.7, &"z".repeat(4000)), // too big for remainder
        ];
        let payload = build_context(results, 260);
        assert_eq!(payload.full_text_results.len(), 2);
        assert_eq!(payload.summary_results.len(), 1);
        assert!(payload.token_count <= 260);
        assert!(payload.summary_results[0].content.ends_with("..."));
    }

    #[test]
    fn merged_results_sort_by_score_and_dedup() {
        let vector = vec![];
        let merged = merge_results(&vector, &[]);
        assert!(merged.is_empty());

        let a = vector_result("same", 0.5, "low");
        let b = vector_result("same", 0.9, "high");
        let mut list = vec![a, b];
        list.sort_by(|x, y| y.score.total_cmp(&x.score));
        // dedup behavior is covered through merge_results with real inputs in
        // the service tests; here we assert ordering survives.
        assert_eq!(list[0].content, "high");
    }

    #[test]
    fn markdown_rendering_labels_sources() {
        let payload = build_context(vec![vector_result("a", 0.9, "Coverage details")], 1000);
        let markdown = format_context_markdown(&payload);
        assert!(markdown.contains("# Retrieved Context"));
        assert!(markdown.contains("[policy.pdf | coverages | pages 2]"));
        assert!(markdown.contains("Coverage details"));
    }

    #[test]
    fn section_token_counts_track_sections() {
        let payload = build_context(
            vec![
                vector_result("a", 0.9, &"x".repeat(40)),
                vector_result("b", 0.8, &"y".repeat(40)),
            ],
            1000,
        );
        assert_eq!(payload.section_token_counts.get("coverages"), Some(&20));
    }
}
