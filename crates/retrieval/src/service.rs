//! The GraphRAG orchestrator: strictly ordered stages with per-stage latency
//! capture and vector-only fallback when graph expansion fails.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::context::{build_context, merge_results};
use crate::expansion::GraphExpansionService;
use crate::plan::{understand_query, QueryIntent};
use crate::respond::{ResponseGenerationService, SourceCitation};
use crate::vector::{VectorRetrievalService, DEFAULT_DISTANCE_THRESHOLD, DEFAULT_VECTOR_TOP_K};
use crate::RetrievalError;

/// Static reply for conversational queries that short-circuit the pipeline.
pub const GENERAL_QUERY_RESPONSE: &str = "I answer questions about the insurance documents \
indexed in this workspace: policies, coverages, exclusions, locations, claims, and their \
relationships. Ask about a specific policy, coverage, or claim to get started.";

/// Query request (transport-agnostic).
#[derive(Debug, Clone)]
pub struct GraphRagRequest {
    pub query: String,
    pub document_ids: Option<Vec<Uuid>>,
    pub intent_override: Option<QueryIntent>,
    pub max_context_tokens: usize,
}

impl GraphRagRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            document_ids: None,
            intent_override: None,
            max_context_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    pub intent: QueryIntent,
    pub traversal_depth: u32,
    pub vector_results_count: usize,
    pub graph_results_count: usize,
    pub merged_results_count: usize,
    pub full_text_count: usize,
    pub summary_count: usize,
    pub total_context_tokens: usize,
    pub latency_ms: u64,
    pub stage_latencies: BTreeMap<&'static str, u64>,
    pub graph_available: bool,
    pub fallback_mode: bool,
}

#[derive(Debug, Clone)]
pub struct GraphRagResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub metadata: ResponseMetadata,
    pub timestamp: DateTime<Utc>,
}

pub struct GraphRagService {
    vector_retrieval: VectorRetrievalService,
    graph_expansion: GraphExpansionService,
    response_generator: ResponseGenerationService,
}

impl GraphRagService {
    pub fn new(
        vector_retrieval: VectorRetrievalService,
        graph_expansion: GraphExpansionService,
        response_generator: ResponseGenerationService,
    ) -> Self {
        Self {
            vector_retrieval,
            graph_expansion,
            response_generator,
        }
    }

    pub async fn query(
        &self,
        workflow_id: Uuid,
        request: GraphRagRequest,
    ) -> Result<GraphRagResponse, RetrievalError> {
        let start = Instant::now();
        let mut stage_latencies: BTreeMap<&'static str, u64> = BTreeMap::new();

        // Stage 1: query understanding.
        let stage_start = Instant::now();
        let mut query_plan = understand_query(&request.query, request.document_ids.clone());
        if let Some(intent) = request.intent_override {
            query_plan.intent = intent;
            query_plan.traversal_depth = intent.traversal_depth();
        }
        stage_latencies.insert("query_understanding", elapsed_ms(stage_start));

        if query_plan.intent == QueryIntent::General {
            info!(query = %truncate(&request.query, 100), "short-circuiting pipeline for GENERAL intent");
            return Ok(GraphRagResponse {
                answer: GENERAL_QUERY_RESPONSE.to_string(),
                sources: Vec::new(),
                metadata: ResponseMetadata {
                    intent: QueryIntent::General,
                    traversal_depth: 0,
                    vector_results_count: 0,
                    graph_results_count: 0,
                    merged_results_count: 0,
                    full_text_count: 0,
                    summary_count: 0,
                    total_context_tokens: 0,
                    latency_ms: elapsed_ms(start),
                    stage_latencies,
                    graph_available: true,
                    fallback_mode: false,
                },
                timestamp: Utc::now(),
            });
        }

        // Stage 2: vector retrieval.
        let stage_start = Instant::now();
        let vector_results = self
            .vector_retrieval
            .retrieve(
                &query_plan,
                workflow_id,
                DEFAULT_VECTOR_TOP_K,
                DEFAULT_DISTANCE_THRESHOLD,
            )
            .await?;
        stage_latencies.insert("vector_retrieval", elapsed_ms(stage_start));

        // Stage 3: graph expansion (non-fatal).
        let stage_start = Instant::now();
        let mut graph_available = true;
        let mut fallback_mode = false;
        let graph_results = match self
            .graph_expansion
            .expand(&vector_results, &query_plan, workflow_id)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                error!(error = %err, "graph expansion failed, falling back to vector-only");
                graph_available = false;
                fallback_mode = true;
                Vec::new()
            }
        };
        stage_latencies.insert("graph_expansion", elapsed_ms(stage_start));

        // Stage 4: context assembly.
        let stage_start = Instant::now();
        let merged = merge_results(&vector_results, &graph_results);
        let merged_count = merged.len();
        let context = build_context(merged, request.max_context_tokens);
        stage_latencies.insert("context_assembly", elapsed_ms(stage_start));

        // Stage 5: response generation + citation attachment.
        let stage_start = Instant::now();
        let generated = self
            .response_generator
            .generate_response(&request.query, &context)
            .await?;
        let sources = self
            .response_generator
            .attach_citations(&context, &generated.cited_source_ids)
            .await?;
        stage_latencies.insert("response_generation", elapsed_ms(stage_start));

        info!(
            intent = query_plan.intent.as_str(),
            vector_results = vector_results.len(),
            graph_results = graph_results.len(),
            full_text = context.full_text_results.len(),
            summaries = context.summary_results.len(),
            context_tokens = context.token_count,
            "graphrag query complete"
        );

        Ok(GraphRagResponse {
            answer: generated.answer,
            sources,
            metadata: ResponseMetadata {
                intent: query_plan.intent,
                traversal_depth: query_plan.traversal_depth,
                vector_results_count: vector_results.len(),
                graph_results_count: graph_results.len(),
                merged_results_count: merged_count,
                full_text_count: context.full_text_results.len(),
                summary_count: context.summary_results.len(),
                total_context_tokens: context.token_count,
                latency_ms: elapsed_ms(start),
                stage_latencies,
                graph_available,
                fallback_mode,
            },
            timestamp: Utc::now(),
        })
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
