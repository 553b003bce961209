//! Repository for `citations`.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{Citation, CitationSpan, ExtractionMethod, PageRange};

use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct CitationRepository {
    pool: PgPool,
}

impl CitationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert on `(document_id, source_type, source_id)`; re-runs
    /// overwrite spans and verbatim text.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        document_id: Uuid,
        source_type: &str,
        source_id: &str,
        spans: &[CitationSpan],
        verbatim_text: &str,
        primary_page: i32,
        page_range: PageRange,
        extraction_confidence: f64,
        extraction_method: ExtractionMethod,
        clause_reference: Option<&str>,
    ) -> StoreResult<Citation> {
        if source_type.trim().is_empty() || source_id.trim().is_empty() {
            return Err(StoreError::Validation(
                "source_type and source_id must not be empty".into(),
            ));
        }
        let spans_json =
            serde_json::to_value(spans).map_err(|e| StoreError::Validation(e.to_string()))?;
        let page_range_json =
            serde_json::to_value(page_range).map_err(|e| StoreError::Validation(e.to_string()))?;

        let row = sqlx::query_as::<_, Citation>(
            r#"
            INSERT INTO citations
                (id, document_id, source_type, source_id, spans, verbatim_text, primary_page,
                 page_range, extraction_confidence, extraction_method, clause_reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (document_id, source_type, source_id)
            DO UPDATE SET
                spans = EXCLUDED.spans,
                verbatim_text = EXCLUDED.verbatim_text,
                primary_page = EXCLUDED.primary_page,
                page_range = EXCLUDED.page_range,
                extraction_confidence = EXCLUDED.extraction_confidence,
                extraction_method = EXCLUDED.extraction_method,
                clause_reference = EXCLUDED.clause_reference
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(source_type)
        .bind(source_id)
        .bind(spans_json)
        .bind(verbatim_text)
        .bind(primary_page)
        .bind(page_range_json)
        .bind(extraction_confidence)
        .bind(extraction_method.as_str())
        .bind(clause_reference)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_source(
        &self,
        document_id: Uuid,
        source_type: &str,
        source_id: &str,
    ) -> StoreResult<Option<Citation>> {
        let row = sqlx::query_as::<_, Citation>(
            r#"
            SELECT * FROM citations
            WHERE document_id = $1 AND source_type = $2 AND source_id = $3
            "#,
        )
        .bind(document_id)
        .bind(source_type)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_document(
        &self,
        document_id: Uuid,
        source_type: Option<&str>,
    ) -> StoreResult<Vec<Citation>> {
        let rows = match source_type {
            Some(source_type) => {
                sqlx::query_as::<_, Citation>(
                    r#"
                    SELECT * FROM citations
                    WHERE document_id = $1 AND source_type = $2
                    ORDER BY primary_page, created_at
                    "#,
                )
                .bind(document_id)
                .bind(source_type)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Citation>(
                    "SELECT * FROM citations WHERE document_id = $1 ORDER BY primary_page, created_at",
                )
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Bulk lookup by source ids, used when attaching citations to answers.
    pub async fn get_by_source_ids(
        &self,
        document_ids: &[Uuid],
        source_ids: &[String],
    ) -> StoreResult<Vec<Citation>> {
        if document_ids.is_empty() || source_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Citation>(
            r#"
            SELECT * FROM citations
            WHERE document_id = ANY($1) AND source_id = ANY($2)
            "#,
        )
        .bind(document_ids)
        .bind(source_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
