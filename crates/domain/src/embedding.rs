//! Vector embeddings and index/graph sync state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primary embedding model for the whole pipeline.
pub const EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Dimension of the primary model; a stored row with a different dimension
/// for this model is an invariant breach.
pub const EMBEDDING_DIM: usize = 384;

/// Current embedding version; rows with an older version are stale.
pub const EMBEDDING_VERSION: &str = "v1";

/// Dense vector associated with an artifact (a chunk or a section entity).
///
/// `(document_id, section_type, entity_id, embedding_model,
/// embedding_version)` uniquely identifies a row. For chunks `entity_id` is
/// the stable chunk id; for section entities it is
/// `"<section_type>_<suffix>"`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VectorEmbedding {
    pub id: Uuid,
    pub document_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub source_chunk_id: Option<Uuid>,
    pub section_type: String,
    /// `"chunk"` for chunk-level rows, otherwise the section entity kind
    /// (`coverage`, `exclusion`, `location`, ...).
    pub entity_type: String,
    pub entity_id: String,
    pub embedding_model: String,
    pub embedding_dim: i32,
    pub embedding_version: String,
    pub embedding: pgvector::Vector,
    /// SHA-256 over the templated text; deterministic for identical input.
    pub content_hash: String,
    pub effective_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub location_id: Option<String>,
    pub embedded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VectorEmbedding {
    pub fn is_chunk(&self) -> bool {
        self.entity_type == "chunk"
    }
}

/// Sync lifecycle shared by embedding and graph sync rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for SyncStatus {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(crate::DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-chunk embedding sync bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmbeddingSyncState {
    pub id: Uuid,
    /// Stable chunk id of the embedded chunk.
    pub chunk_id: String,
    pub embedding_model: String,
    pub embedding_version: String,
    pub vector_dimension: i32,
    #[sqlx(try_from = "String")]
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-canonical-entity graph projection bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraphSyncState {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub neo4j_node_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
