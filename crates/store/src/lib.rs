//! Typed persistence for the docgraph pipeline.
//!
//! One repository struct per aggregate over a shared `sqlx::PgPool`, plus
//! intent-specific queries (cosine search, adjacency fetch, aggregate
//! recompute under row locks). All repositories that write derived artifacts
//! are idempotent per logical key: reruns with identical inputs do not
//! produce duplicates.
//!
//! The reference DDL lives in `schema.sql` next to this crate; migration
//! tooling is an external concern.

pub mod citations;
pub mod documents;
pub mod embeddings;
pub mod entities;
pub mod error;
pub mod extractions;
pub mod relationships;
pub mod sync;
pub mod tables;
pub mod workflows;

pub use citations::CitationRepository;
pub use documents::{
    DocumentChunkRepository, DocumentPageRepository, DocumentRepository, OcrWordRepository,
};
pub use embeddings::{NewEmbedding, ScoredEmbedding, SearchFilters, VectorEmbeddingRepository};
pub use entities::{
    merge_attributes, CanonicalEntityRepository, EntityEvidenceRepository, EntityMentionRepository,
    WorkflowScopeRepository,
};
pub use error::{StoreError, StoreResult};
pub use extractions::SectionExtractionRepository;
pub use relationships::EntityRelationshipRepository;
pub use sync::{EmbeddingSyncStateRepository, GraphSyncStateRepository};
pub use tables::DocumentTableRepository;
pub use workflows::{rollup_from_stage_runs, WorkflowRepository};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Connect a pooled Postgres client with sane pipeline defaults.
pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}
