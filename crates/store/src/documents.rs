//! Repositories for documents and their owned page/chunk/OCR artifacts.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{
    Document, DocumentChunk, DocumentPage, DocumentStatus, OcrWord, PageRange,
};

use crate::error::{StoreError, StoreResult};

/// CRUD over `documents`.
#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        file_path: &str,
        mime_type: Option<&str>,
        page_count: Option<i32>,
        user_id: Option<Uuid>,
    ) -> StoreResult<Document> {
        if file_path.trim().is_empty() {
            return Err(StoreError::Validation("file_path must not be empty".into()));
        }
        let row = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, user_id, file_path, mime_type, page_count, status, uploaded_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'uploaded', $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(file_path)
        .bind(mime_type)
        .bind(page_count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn require(&self, id: Uuid) -> StoreResult<Document> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }

    pub async fn update_status(&self, id: Uuid, status: DocumentStatus) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("document {id}")));
        }
        Ok(())
    }

    /// Most recent classification label for a document, when one exists.
    pub async fn latest_classification(&self, document_id: Uuid) -> StoreResult<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT classified_type FROM document_classifications
            WHERE document_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(label,)| label))
    }

    /// Bulk filename lookup for source rendering.
    pub async fn file_names(&self, ids: &[Uuid]) -> StoreResult<Vec<(Uuid, String)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, file_path FROM documents WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, path)| {
                let name = path
                    .rsplit(['/', '\\'])
                    .next()
                    .unwrap_or(path.as_str())
                    .to_string();
                (id, name)
            })
            .collect())
    }
}

/// CRUD over `document_pages`; the citation mapper resolves dimensions here.
#[derive(Clone)]
pub struct DocumentPageRepository {
    pool: PgPool,
}

impl DocumentPageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        document_id: Uuid,
        page_number: i32,
        width_points: f64,
        height_points: f64,
        rotation: i32,
        page_metadata: Option<serde_json::Value>,
    ) -> StoreResult<DocumentPage> {
        if page_number < 1 {
            return Err(StoreError::Validation("page_number is 1-indexed".into()));
        }
        if !matches!(rotation, 0 | 90 | 180 | 270) {
            return Err(StoreError::Validation(format!(
                "rotation must be one of 0/90/180/270, got {rotation}"
            )));
        }
        let row = sqlx::query_as::<_, DocumentPage>(
            r#"
            INSERT INTO document_pages
                (id, document_id, page_number, width_points, height_points, rotation, page_metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(page_number)
        .bind(width_points)
        .bind(height_points)
        .bind(rotation)
        .bind(page_metadata)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_page(
        &self,
        document_id: Uuid,
        page_number: i32,
    ) -> StoreResult<Option<DocumentPage>> {
        let row = sqlx::query_as::<_, DocumentPage>(
            "SELECT * FROM document_pages WHERE document_id = $1 AND page_number = $2",
        )
        .bind(document_id)
        .bind(page_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_all(&self, document_id: Uuid) -> StoreResult<Vec<DocumentPage>> {
        let rows = sqlx::query_as::<_, DocumentPage>(
            "SELECT * FROM document_pages WHERE document_id = $1 ORDER BY page_number",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// CRUD over `document_chunks`.
#[derive(Clone)]
pub struct DocumentChunkRepository {
    pool: PgPool,
}

impl DocumentChunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        document_id: Uuid,
        page_number: i32,
        chunk_index: i32,
        section_type: Option<&str>,
        effective_section_type: Option<&str>,
        subsection_type: Option<&str>,
        raw_text: &str,
        token_count: i32,
    ) -> StoreResult<DocumentChunk> {
        let stable_chunk_id = domain::stable_chunk_id(document_id, page_number, chunk_index);
        let row = sqlx::query_as::<_, DocumentChunk>(
            r#"
            INSERT INTO document_chunks
                (id, document_id, stable_chunk_id, page_number, chunk_index,
                 section_type, effective_section_type, subsection_type, raw_text, token_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(stable_chunk_id)
        .bind(page_number)
        .bind(chunk_index)
        .bind(section_type)
        .bind(effective_section_type)
        .bind(subsection_type)
        .bind(raw_text)
        .bind(token_count)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<DocumentChunk>> {
        let row = sqlx::query_as::<_, DocumentChunk>("SELECT * FROM document_chunks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// All chunks for a document, in reading order.
    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<DocumentChunk>> {
        let rows = sqlx::query_as::<_, DocumentChunk>(
            r#"
            SELECT * FROM document_chunks
            WHERE document_id = $1
            ORDER BY page_number, chunk_index
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_by_stable_ids(&self, stable_ids: &[String]) -> StoreResult<Vec<DocumentChunk>> {
        if stable_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE stable_chunk_id = ANY($1)",
        )
        .bind(stable_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Read side for OCR word coordinates (Tier-1 citation mapping).
#[derive(Clone)]
pub struct OcrWordRepository {
    pool: PgPool,
}

impl OcrWordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a page worth of words in a single multi-row statement.
    pub async fn create_page_words(
        &self,
        document_id: Uuid,
        page_number: i32,
        words: &[(String, f64, f64, f64, f64)],
    ) -> StoreResult<u64> {
        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO ocr_tokens (id, document_id, page_number, word_index, text, x0, y0, x1, y1) ",
        );
        builder.push_values(words.iter().enumerate(), |mut b, (idx, (text, x0, y0, x1, y1))| {
            b.push_bind(Uuid::new_v4())
                .push_bind(document_id)
                .push_bind(page_number)
                .push_bind(idx as i32)
                .push_bind(text)
                .push_bind(x0)
                .push_bind(y0)
                .push_bind(x1)
                .push_bind(y1);
        });
        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Words for a page range in reading order.
    pub async fn load_words(
        &self,
        document_id: Uuid,
        page_range: PageRange,
    ) -> StoreResult<Vec<OcrWord>> {
        let rows = sqlx::query_as::<_, OcrWord>(
            r#"
            SELECT * FROM ocr_tokens
            WHERE document_id = $1 AND page_number BETWEEN $2 AND $3
            ORDER BY page_number, word_index
            "#,
        )
        .bind(document_id)
        .bind(page_range.start)
        .bind(page_range.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
