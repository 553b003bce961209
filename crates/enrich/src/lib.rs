//! Entity enrichment: aggregation, canonical resolution, and relationship
//! extraction.
//!
//! This crate is the `enriched` stage of the pipeline. It turns raw
//! section-level entity mentions into a deduplicated canonical entity graph
//! with evidence-backed, closed-vocabulary relationships:
//!
//! 1. [`EntityAggregator`] gathers candidates across a document's chunks,
//!    filters low-quality coverage/exclusion names, deduplicates by
//!    deterministic entity id, and merges rich extraction context.
//! 2. [`EntityResolver`] upserts canonical entities (monotonic attribute
//!    merge) and records mentions, evidence, and workflow scope.
//! 3. [`RelationshipExtractor`] runs semantic section batches plus a
//!    cross-batch synthesis pass, reconciles the model's entity identifiers
//!    back to canonical rows, and persists evidence-bound edges.

pub mod aggregator;
pub mod batching;
pub mod candidate;
pub mod filter;
pub mod reconcile;
pub mod relationships;
pub mod resolver;
pub mod synthesizer;

pub use aggregator::{AggregatedEntities, ChunkEntityMapping, EntityAggregator, RichContext};
pub use batching::{partition_sections, BatchChunk, SectionPairing, SemanticBatch, SECTION_PAIRINGS};
pub use candidate::EntityCandidate;
pub use filter::{filter_low_quality, FilterStats, MIN_CONFIDENCE_THRESHOLD, MIN_NAME_LENGTH};
pub use reconcile::{deduplicate_relationships, find_entity, RawRelationship, TempIndex};
pub use relationships::RelationshipExtractor;
pub use resolver::EntityResolver;
pub use synthesizer::synthesize_entities;

use thiserror::Error;

/// System prompt for relationship extraction, shipped as a versioned
/// resource.
pub const RELATIONSHIP_EXTRACTION_PROMPT: &str =
    include_str!("../prompts/relationship_extraction.md");

/// Template for the cross-batch synthesis pass.
pub const CROSS_BATCH_SYNTHESIS_PROMPT: &str = include_str!("../prompts/cross_batch_synthesis.md");

/// Version recorded with relationship extraction outputs.
pub const RELATIONSHIP_PROMPT_VERSION: &str = "relationships-v1";

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Llm(#[from] llm::LlmError),
    #[error("invalid entity candidate: {0}")]
    InvalidCandidate(String),
}
