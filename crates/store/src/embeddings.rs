//! Repository for `vector_embeddings` (pgvector, cosine distance).

use chrono::{NaiveDate, Utc};
use pgvector::Vector;
use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use domain::{PageRange, VectorEmbedding, EMBEDDING_DIM, EMBEDDING_MODEL};

use crate::error::{StoreError, StoreResult};

/// Filters applied to a semantic search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub workflow_id: Option<Uuid>,
    pub document_ids: Option<Vec<Uuid>>,
    pub section_types: Option<Vec<String>>,
    pub entity_types: Option<Vec<String>>,
    /// Restrict to chunk embeddings whose source chunk lies in this page
    /// range (Tier-2 citation mapping).
    pub page_range: Option<PageRange>,
}

/// One search hit with its cosine distance.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredEmbedding {
    #[sqlx(flatten)]
    pub embedding: VectorEmbedding,
    pub distance: f64,
}

/// Fields needed to write one embedding row.
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub document_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub source_chunk_id: Option<Uuid>,
    pub section_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub embedding_model: String,
    pub embedding_version: String,
    pub embedding: Vec<f32>,
    pub content_hash: String,
    pub effective_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub location_id: Option<String>,
}

#[derive(Clone)]
pub struct VectorEmbeddingRepository {
    pool: PgPool,
}

impl VectorEmbeddingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one embedding row. Idempotent per the
    /// `(document_id, section_type, entity_id, model, version)` key.
    ///
    /// A dimension mismatch for the primary model is an invariant breach and
    /// surfaces as `Fatal`.
    pub async fn create(&self, new: NewEmbedding) -> StoreResult<VectorEmbedding> {
        if new.embedding_model == EMBEDDING_MODEL && new.embedding.len() != EMBEDDING_DIM {
            return Err(StoreError::Fatal(format!(
                "embedding dimension {} != {} for model {}",
                new.embedding.len(),
                EMBEDDING_DIM,
                new.embedding_model
            )));
        }
        let dim = new.embedding.len() as i32;
        let row = sqlx::query_as::<_, VectorEmbedding>(
            r#"
            INSERT INTO vector_embeddings
                (id, document_id, workflow_id, source_chunk_id, section_type, entity_type,
                 entity_id, embedding_model, embedding_dim, embedding_version, embedding,
                 content_hash, effective_date, expiration_date, location_id, embedded_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            ON CONFLICT (document_id, section_type, entity_id, embedding_model, embedding_version)
            DO UPDATE SET
                embedding = EXCLUDED.embedding,
                content_hash = EXCLUDED.content_hash,
                workflow_id = EXCLUDED.workflow_id,
                source_chunk_id = EXCLUDED.source_chunk_id,
                entity_type = EXCLUDED.entity_type,
                effective_date = EXCLUDED.effective_date,
                expiration_date = EXCLUDED.expiration_date,
                location_id = EXCLUDED.location_id,
                embedded_at = EXCLUDED.embedded_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.document_id)
        .bind(new.workflow_id)
        .bind(new.source_chunk_id)
        .bind(&new.section_type)
        .bind(&new.entity_type)
        .bind(&new.entity_id)
        .bind(&new.embedding_model)
        .bind(dim)
        .bind(&new.embedding_version)
        .bind(Vector::from(new.embedding.clone()))
        .bind(&new.content_hash)
        .bind(new.effective_date)
        .bind(new.expiration_date)
        .bind(&new.location_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Cosine-distance search with filters; results ordered ascending by
    /// distance and cut at `max_distance` when given.
    pub async fn semantic_search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filters: &SearchFilters,
        max_distance: Option<f64>,
    ) -> StoreResult<Vec<ScoredEmbedding>> {
        let vector = Vector::from(query_vector.to_vec());

        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT ve.*, (ve.embedding <=> ");
        qb.push_bind(vector.clone());
        qb.push(") AS distance FROM vector_embeddings ve");
        if filters.page_range.is_some() {
            qb.push(" JOIN document_chunks dc ON dc.id = ve.source_chunk_id");
        }
        qb.push(" WHERE 1 = 1");
        if let Some(workflow_id) = filters.workflow_id {
            qb.push(" AND ve.workflow_id = ").push_bind(workflow_id);
        }
        if let Some(document_ids) = &filters.document_ids {
            if !document_ids.is_empty() {
                qb.push(" AND ve.document_id = ANY(")
                    .push_bind(document_ids.clone())
                    .push(")");
            }
        }
        if let Some(section_types) = &filters.section_types {
            if !section_types.is_empty() {
                qb.push(" AND ve.section_type = ANY(")
                    .push_bind(section_types.clone())
                    .push(")");
            }
        }
        if let Some(entity_types) = &filters.entity_types {
            if !entity_types.is_empty() {
                qb.push(" AND ve.entity_type = ANY(")
                    .push_bind(entity_types.clone())
                    .push(")");
            }
        }
        if let Some(range) = filters.page_range {
            qb.push(" AND dc.page_number BETWEEN ")
                .push_bind(range.start)
                .push(" AND ")
                .push_bind(range.end);
        }
        if let Some(max_distance) = max_distance {
            qb.push(" AND (ve.embedding <=> ")
                .push_bind(vector)
                .push(") <= ")
                .push_bind(max_distance);
        }
        qb.push(" ORDER BY distance ASC LIMIT ")
            .push_bind(top_k as i64);

        let rows = qb
            .build_query_as::<ScoredEmbedding>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Multi-query search: run one search per query vector and keep the best
    /// (smallest) distance per embedding row, ordered ascending.
    pub async fn semantic_search_multi_query(
        &self,
        query_vectors: &[Vec<f32>],
        top_k: usize,
        filters: &SearchFilters,
        max_distance: Option<f64>,
    ) -> StoreResult<Vec<ScoredEmbedding>> {
        let mut best: HashMap<Uuid, ScoredEmbedding> = HashMap::new();
        for vector in query_vectors {
            let hits = self
                .semantic_search(vector, top_k, filters, max_distance)
                .await?;
            for hit in hits {
                match best.get(&hit.embedding.id) {
                    Some(existing) if existing.distance <= hit.distance => {}
                    _ => {
                        best.insert(hit.embedding.id, hit);
                    }
                }
            }
        }
        let mut merged: Vec<ScoredEmbedding> = best.into_values().collect();
        merged.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        merged.truncate(top_k);
        Ok(merged)
    }

    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<VectorEmbedding>> {
        let rows = sqlx::query_as::<_, VectorEmbedding>(
            "SELECT * FROM vector_embeddings WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Re-embedding rule: drop every row for this `(document, workflow)`
    /// before writing the new set, so stale vectors cannot drift.
    pub async fn delete_by_document_and_workflow(
        &self,
        document_id: Uuid,
        workflow_id: Uuid,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM vector_embeddings WHERE document_id = $1 AND workflow_id = $2",
        )
        .bind(document_id)
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Drop existing chunk-level rows for a document ahead of a re-run.
    pub async fn delete_chunk_embeddings(&self, document_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM vector_embeddings WHERE document_id = $1 AND entity_type = 'chunk'",
        )
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Distinct content hashes for a workflow, used by idempotence checks.
    pub async fn content_hashes(&self, workflow_id: Uuid) -> StoreResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT DISTINCT content_hash FROM vector_embeddings WHERE workflow_id = $1 ORDER BY content_hash",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(h,)| h).collect())
    }
}
