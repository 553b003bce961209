//! Sync-state repositories for the vector index and the graph projection.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{EmbeddingSyncState, GraphSyncState, SyncStatus};

use crate::error::StoreResult;

#[derive(Clone)]
pub struct EmbeddingSyncStateRepository {
    pool: PgPool,
}

impl EmbeddingSyncStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert per `(chunk_id, embedding_model)`.
    pub async fn upsert(
        &self,
        chunk_id: &str,
        embedding_model: &str,
        embedding_version: &str,
        vector_dimension: i32,
        status: SyncStatus,
        sync_error: Option<&str>,
    ) -> StoreResult<EmbeddingSyncState> {
        let now = Utc::now();
        let last_synced_at = matches!(status, SyncStatus::Synced).then_some(now);
        let row = sqlx::query_as::<_, EmbeddingSyncState>(
            r#"
            INSERT INTO embedding_sync_state
                (id, chunk_id, embedding_model, embedding_version, vector_dimension,
                 sync_status, last_synced_at, sync_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (chunk_id, embedding_model)
            DO UPDATE SET
                embedding_version = EXCLUDED.embedding_version,
                vector_dimension = EXCLUDED.vector_dimension,
                sync_status = EXCLUDED.sync_status,
                last_synced_at = EXCLUDED.last_synced_at,
                sync_error = EXCLUDED.sync_error,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(chunk_id)
        .bind(embedding_model)
        .bind(embedding_version)
        .bind(vector_dimension)
        .bind(status.as_str())
        .bind(last_synced_at)
        .bind(sync_error)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Reset a chunk back to `pending` and clear its error.
    pub async fn mark_for_resync(&self, chunk_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE embedding_sync_state
            SET sync_status = 'pending', sync_error = NULL, updated_at = $2
            WHERE chunk_id = $1
            "#,
        )
        .bind(chunk_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Rows whose version differs from the current one.
    pub async fn get_stale_embeddings(
        &self,
        current_version: &str,
    ) -> StoreResult<Vec<EmbeddingSyncState>> {
        let rows = sqlx::query_as::<_, EmbeddingSyncState>(
            "SELECT * FROM embedding_sync_state WHERE embedding_version <> $1",
        )
        .bind(current_version)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_by_chunk(&self, chunk_id: &str) -> StoreResult<Vec<EmbeddingSyncState>> {
        let rows = sqlx::query_as::<_, EmbeddingSyncState>(
            "SELECT * FROM embedding_sync_state WHERE chunk_id = $1",
        )
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct GraphSyncStateRepository {
    pool: PgPool,
}

impl GraphSyncStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        entity_id: Uuid,
        entity_type: &str,
        neo4j_node_id: Option<&str>,
        status: SyncStatus,
        sync_error: Option<&str>,
    ) -> StoreResult<GraphSyncState> {
        let now = Utc::now();
        let last_synced_at = matches!(status, SyncStatus::Synced).then_some(now);
        let row = sqlx::query_as::<_, GraphSyncState>(
            r#"
            INSERT INTO graph_sync_state
                (id, entity_id, entity_type, neo4j_node_id, sync_status,
                 last_synced_at, sync_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT (entity_id)
            DO UPDATE SET
                entity_type = EXCLUDED.entity_type,
                neo4j_node_id = EXCLUDED.neo4j_node_id,
                sync_status = EXCLUDED.sync_status,
                last_synced_at = EXCLUDED.last_synced_at,
                sync_error = EXCLUDED.sync_error,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entity_id)
        .bind(entity_type)
        .bind(neo4j_node_id)
        .bind(status.as_str())
        .bind(last_synced_at)
        .bind(sync_error)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn mark_for_resync(&self, entity_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE graph_sync_state
            SET sync_status = 'pending', sync_error = NULL, updated_at = $2
            WHERE entity_id = $1
            "#,
        )
        .bind(entity_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_pending(&self) -> StoreResult<Vec<GraphSyncState>> {
        let rows = sqlx::query_as::<_, GraphSyncState>(
            "SELECT * FROM graph_sync_state WHERE sync_status = 'pending'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
