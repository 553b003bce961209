//! Repository for `section_extractions`.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{PageRange, SectionExtraction, SourceChunks};

use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct SectionExtractionRepository {
    pool: PgPool,
}

impl SectionExtractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create one section extraction row. Idempotent per
    /// `(document_id, workflow_id, section_type, pipeline_run_id)`: a rerun
    /// with the same key overwrites the previous extraction.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        document_id: Uuid,
        workflow_id: Uuid,
        section_type: &str,
        extracted_fields: JsonValue,
        page_range: PageRange,
        confidence: f64,
        source_chunks: &SourceChunks,
        model_version: Option<&str>,
        prompt_version: Option<&str>,
        pipeline_run_id: Option<Uuid>,
    ) -> StoreResult<SectionExtraction> {
        if section_type.trim().is_empty() {
            return Err(StoreError::Validation(
                "section_type must not be empty".into(),
            ));
        }
        let page_range_json = serde_json::to_value(page_range)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let source_chunks_json = serde_json::to_value(source_chunks)
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        let row = sqlx::query_as::<_, SectionExtraction>(
            r#"
            INSERT INTO section_extractions
                (id, document_id, workflow_id, pipeline_run_id, section_type,
                 extracted_fields, page_range, confidence, source_chunks,
                 model_version, prompt_version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (document_id, workflow_id, section_type, pipeline_run_id)
            DO UPDATE SET
                extracted_fields = EXCLUDED.extracted_fields,
                page_range = EXCLUDED.page_range,
                confidence = EXCLUDED.confidence,
                source_chunks = EXCLUDED.source_chunks,
                model_version = EXCLUDED.model_version,
                prompt_version = EXCLUDED.prompt_version
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(workflow_id)
        .bind(pipeline_run_id)
        .bind(section_type)
        .bind(extracted_fields)
        .bind(page_range_json)
        .bind(confidence)
        .bind(source_chunks_json)
        .bind(model_version)
        .bind(prompt_version)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<SectionExtraction>> {
        let rows = sqlx::query_as::<_, SectionExtraction>(
            "SELECT * FROM section_extractions WHERE document_id = $1 ORDER BY created_at",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Filtered fetch used by retrieval content resolution.
    pub async fn get_by_document_and_section(
        &self,
        document_id: Uuid,
        section_type: &str,
        workflow_id: Option<Uuid>,
    ) -> StoreResult<Vec<SectionExtraction>> {
        let rows = match workflow_id {
            Some(workflow_id) => {
                sqlx::query_as::<_, SectionExtraction>(
                    r#"
                    SELECT * FROM section_extractions
                    WHERE document_id = $1 AND section_type = $2 AND workflow_id = $3
                    ORDER BY created_at
                    "#,
                )
                .bind(document_id)
                .bind(section_type)
                .bind(workflow_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SectionExtraction>(
                    r#"
                    SELECT * FROM section_extractions
                    WHERE document_id = $1 AND section_type = $2
                    ORDER BY created_at
                    "#,
                )
                .bind(document_id)
                .bind(section_type)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}
