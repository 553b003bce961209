//! Shared data model for the docgraph pipeline.
//!
//! This crate holds the persisted entity types (documents, chunks, section
//! extractions, canonical entities, relationships, workflows, embeddings,
//! citations, tables), the status vocabularies, and the deterministic
//! identity functions every other crate must agree on.
//!
//! Ownership follows the ingestion model: documents cascade-own their pages,
//! chunks, extractions, mentions, and citations. Canonical entities are
//! globally shared; evidence rows bind them to documents; relationships are
//! tagged with originating document and workflow for provenance.

pub mod citation;
pub mod document;
pub mod embedding;
pub mod entity;
pub mod identity;
pub mod relationship;
pub mod table;
pub mod workflow;

pub use citation::{BoundingBox, Citation, CitationSpan, ExtractionMethod};
pub use document::{
    Document, DocumentChunk, DocumentPage, DocumentStatus, OcrWord, PageRange, SectionExtraction,
    SourceChunks,
};
pub use embedding::{
    EmbeddingSyncState, GraphSyncState, SyncStatus, VectorEmbedding, EMBEDDING_DIM,
    EMBEDDING_MODEL, EMBEDDING_VERSION,
};
pub use entity::{CanonicalEntity, EntityEvidence, EntityMention, EntityType, EvidenceType};
pub use identity::{canonical_key, entity_id, stable_chunk_id, stable_table_id};
pub use relationship::{sanitize_relationship_type, EntityRelationship, RelationshipType};
pub use table::{DocumentTable, LossRunClaim, SovItem, TableType};
pub use workflow::{
    aggregate_stage_status, PipelineStage, StageStatus, Workflow, WorkflowDocument,
    WorkflowDocumentStageRun, WorkflowRunEvent, WorkflowStageRun, WorkflowStatus,
};

use thiserror::Error;

/// Errors surfaced when parsing persisted vocabulary values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown relationship type: {0}")]
    UnknownRelationshipType(String),
    #[error("unknown evidence type: {0}")]
    UnknownEvidenceType(String),
    #[error("unknown pipeline stage: {0}")]
    UnknownStage(String),
    #[error("unknown status value: {0}")]
    UnknownStatus(String),
}
