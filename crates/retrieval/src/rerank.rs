//! Intent-aware reranking of raw vector hits.
//!
//! Three additive boosts on top of the base similarity: a section boost from
//! an intent-to-section table, an entity boost for matches against
//! query-derived entities, and a recency boost that decays linearly with the
//! embedding's effective date.

use chrono::{NaiveDate, Utc};
use tracing::info;

use store::ScoredEmbedding;

use crate::plan::{ExtractedQueryEntities, QueryIntent};

/// Boost added on an exact entity-type filter match (half for coverage-type
/// matches on coverage entities).
pub const ENTITY_MATCH_BOOST: f64 = 0.10;

/// Maximum recency boost at an effective date of today.
pub const RECENCY_BOOST_MAX: f64 = 0.05;

/// Days over which the recency boost decays to zero.
pub const RECENCY_DECAY_DAYS: i64 = 365;

/// One reranked hit.
#[derive(Debug, Clone)]
pub struct RerankedResult {
    pub hit: ScoredEmbedding,
    pub similarity: f64,
    pub final_score: f64,
}

/// Intent-to-section boost table.
fn section_boost(intent: QueryIntent, section_type: &str) -> f64 {
    let table: &[(&str, f64)] = match intent {
        QueryIntent::Qa => &[
            ("declarations", 0.15),
            ("coverages", 0.10),
            ("definitions", 0.05),
        ],
        QueryIntent::Analysis => &[
            ("coverages", 0.15),
            ("exclusions", 0.12),
            ("conditions", 0.10),
            ("schedule_of_values", 0.08),
            ("loss_run", 0.08),
        ],
        QueryIntent::Audit => &[
            ("endorsements", 0.15),
            ("conditions", 0.12),
            ("exclusions", 0.12),
            ("declarations", 0.08),
        ],
        QueryIntent::General => &[],
    };
    table
        .iter()
        .find(|(section, _)| *section == section_type)
        .map(|(_, boost)| *boost)
        .unwrap_or(0.0)
}

pub struct IntentReranker;

impl IntentReranker {
    /// Rerank hits: convert cosine distance `d` into similarity
    /// `max(0, 1 - d)`, apply the boosts, and sort descending by final
    /// score.
    pub fn rerank(
        &self,
        results: Vec<ScoredEmbedding>,
        intent: QueryIntent,
        extracted_entities: &ExtractedQueryEntities,
        entity_type_filters: &[String],
    ) -> Vec<RerankedResult> {
        if results.is_empty() {
            return Vec::new();
        }

        let mut reranked: Vec<RerankedResult> = results
            .into_iter()
            .map(|hit| {
                let similarity = (1.0 - hit.distance).max(0.0);
                let section = section_boost(intent, &hit.embedding.section_type);
                let entity = entity_boost(&hit, extracted_entities, entity_type_filters);
                let recency = recency_boost(hit.embedding.effective_date, Utc::now().date_naive());
                let final_score = similarity + section + entity + recency;
                RerankedResult {
                    hit,
                    similarity,
                    final_score,
                }
            })
            .collect();

        reranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

        info!(
            intent = intent.as_str(),
            total_results = reranked.len(),
            top_score = reranked.first().map(|r| r.final_score).unwrap_or(0.0),
            bottom_score = reranked.last().map(|r| r.final_score).unwrap_or(0.0),
            "reranking complete"
        );
        reranked
    }
}

fn entity_boost(
    hit: &ScoredEmbedding,
    extracted: &ExtractedQueryEntities,
    entity_type_filters: &[String],
) -> f64 {
    let mut boost = 0.0;
    let entity_type = hit.embedding.entity_type.to_lowercase();

    if entity_type_filters
        .iter()
        .any(|f| f.to_lowercase() == entity_type)
    {
        boost += ENTITY_MATCH_BOOST;
    }
    if !extracted.coverage_types.is_empty()
        && matches!(entity_type.as_str(), "coverage" | "coverages")
    {
        boost += ENTITY_MATCH_BOOST * 0.5;
    }
    boost
}

/// Linear decay: full boost at 0 days from today, zero at
/// [`RECENCY_DECAY_DAYS`].
fn recency_boost(effective_date: Option<NaiveDate>, today: NaiveDate) -> f64 {
    let Some(effective_date) = effective_date else {
        return 0.0;
    };
    let days_diff = (today - effective_date).num_days().abs();
    if days_diff >= RECENCY_DECAY_DAYS {
        return 0.0;
    }
    RECENCY_BOOST_MAX * (1.0 - days_diff as f64 / RECENCY_DECAY_DAYS as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::VectorEmbedding;
    use uuid::Uuid;

    fn hit(section: &str, entity_type: &str, distance: f64, effective: Option<NaiveDate>) -> ScoredEmbedding {
        ScoredEmbedding {
            embedding: VectorEmbedding {
                id: Uuid::new_v4(),
                document_id: Uuid::nil(),
                workflow_id: None,
                source_chunk_id: None,
                section_type: section.to_string(),
                entity_type: entity_type.to_string(),
                entity_id: format!("{section}_x"),
                embedding_model: "all-MiniLM-L6-v2".into(),
                embedding_dim: 384,
                embedding_version: "v1".into(),
                embedding: pgvector::Vector::from(vec![0.0f32; 4]),
                content_hash: "h".into(),
                effective_date: effective,
                expiration_date: None,
                location_id: None,
                embedded_at: None,
                created_at: Utc::now(),
            },
            distance,
        }
    }

    #[test]
    fn similarity_is_one_minus_distance_clamped() {
        let reranker = IntentReranker;
        let out = reranker.rerank(
            vec![hit("coverages", "coverage", 1.4, None)],
            QueryIntent::General,
            &ExtractedQueryEntities::default(),
            &[],
        );
        assert_eq!(out[0].similarity, 0.0);
    }

    #[test]
    fn section_boost_reorders_for_intent() {
        let reranker = IntentReranker;
        // Slightly worse distance but boosted section wins under QA.
        let out = reranker.rerank(
            vec![
                hit("loss_run", "claim", 0.30, None),
                hit("declarations", "section", 0.34, None),
            ],
            QueryIntent::Qa,
            &ExtractedQueryEntities::default(),
            &[],
        );
        assert_eq!(out[0].hit.embedding.section_type, "declarations");
    }

    #[test]
    fn entity_filter_match_gets_full_boost() {
        let reranker = IntentReranker;
        let out = reranker.rerank(
            vec![hit("coverages", "coverage", 0.2, None)],
            QueryIntent::Qa,
            &ExtractedQueryEntities::default(),
            &["coverage".to_string()],
        );
        let expected = 0.8 + 0.10 + 0.10; // similarity + section + entity
        assert!((out[0].final_score - expected).abs() < 1e-9);
    }

    #[test]
    fn coverage_type_match_gets_half_boost() {
        let reranker = IntentReranker;
        let extracted = ExtractedQueryEntities {
            coverage_types: vec!["general liability".into()],
            ..Default::default()
        };
        let out = reranker.rerank(
            vec![hit("loss_run", "coverage", 0.2, None)],
            QueryIntent::General,
            &extracted,
            &[],
        );
        assert!((out[0].final_score - (0.8 + 0.05)).abs() < 1e-9);
    }

    #[test]
    fn recency_decays_linearly() {
        let today = Utc::now().date_naive();
        assert!((recency_boost(Some(today), today) - RECENCY_BOOST_MAX).abs() < 1e-9);
        let half = today - chrono::Duration::days(RECENCY_DECAY_DAYS / 2);
        let boost = recency_boost(Some(half), today);
        assert!(boost > 0.0 && boost < RECENCY_BOOST_MAX);
        let old = today - chrono::Duration::days(RECENCY_DECAY_DAYS + 10);
        assert_eq!(recency_boost(Some(old), today), 0.0);
        assert_eq!(recency_boost(None, today), 0.0);
    }
}
