//! Citation-grounded semantic indexing.
//!
//! Deterministic per-section text templates, entity-level and chunk-level
//! embedding generation against the shared 384-dim model, and sync-state
//! bookkeeping. Retrieval re-derives result content through the same
//! templates, which is what makes citations line up with what was indexed.

pub mod chunks;
pub mod embeddings;
pub mod processors;
pub mod templates;

pub use chunks::{contextualized_text, ChunkEmbeddingService, ChunkEmbeddingStats};
pub use embeddings::{EmbeddingRunStats, GenerateEmbeddingsService};
pub use processors::{section_entities, SectionEntity};
pub use templates::{format_currency, format_date, get_field, render, NOT_SPECIFIED};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Semantic(#[from] semantic::SemanticError),
}
