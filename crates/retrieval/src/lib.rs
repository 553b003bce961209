//! GraphRAG retrieval over the indexed knowledge base.
//!
//! Strictly ordered stages: query understanding, filtered multi-query vector
//! retrieval, intent-aware reranking, content resolution through the shared
//! templates, bounded graph expansion over the relationship adjacency,
//! hierarchical context assembly, and a single grounded response call with
//! citations attached. Graph failure degrades to vector-only context rather
//! than failing the query.

pub mod context;
pub mod expansion;
pub mod plan;
pub mod rerank;
pub mod respond;
pub mod service;
pub mod vector;

pub use context::{
    build_context, estimate_tokens, format_context_markdown, merge_results, ContextPayload,
    MergedResult, ResultOrigin,
};
pub use expansion::{relevance_allowlists, GraphExpansionService, GraphResult};
pub use plan::{understand_query, ExtractedQueryEntities, QueryIntent, QueryPlan};
pub use rerank::{
    IntentReranker, RerankedResult, ENTITY_MATCH_BOOST, RECENCY_BOOST_MAX, RECENCY_DECAY_DAYS,
};
pub use respond::{GeneratedResponse, ResponseGenerationService, SourceCitation};
pub use service::{
    GraphRagRequest, GraphRagResponse, GraphRagService, ResponseMetadata, GENERAL_QUERY_RESPONSE,
};
pub use vector::{
    resolve_entity_content, VectorRetrievalService, VectorSearchResult, DEFAULT_DISTANCE_THRESHOLD,
    DEFAULT_VECTOR_TOP_K,
};

use thiserror::Error;

/// System prompt for answer generation, shipped as a versioned resource.
pub const RESPONSE_GENERATION_PROMPT: &str = include_str!("../prompts/response_generation.md");

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Semantic(#[from] semantic::SemanticError),
    #[error(transparent)]
    Llm(#[from] llm::LlmError),
}
