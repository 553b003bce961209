//! Documents and their owned artifacts: pages, chunks, OCR words, and
//! section extractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Ingestion lifecycle of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    OcrProcessing,
    OcrProcessed,
    Classified,
    Extracted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::OcrProcessing => "ocr_processing",
            DocumentStatus::OcrProcessed => "ocr_processed",
            DocumentStatus::Classified => "classified",
            DocumentStatus::Extracted => "extracted",
        }
    }
}

impl TryFrom<String> for DocumentStatus {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "ocr_processing" => Ok(DocumentStatus::OcrProcessing),
            "ocr_processed" => Ok(DocumentStatus::OcrProcessed),
            "classified" => Ok(DocumentStatus::Classified),
            "extracted" => Ok(DocumentStatus::Extracted),
            other => Err(crate::DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of ingestion. Owns pages, chunks, OCR output, section extractions,
/// mentions, and citations (cascade on delete).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub file_path: String,
    pub mime_type: Option<String>,
    pub page_count: Option<i32>,
    #[sqlx(try_from = "String")]
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Filename portion of the stored path, used when rendering sources.
    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_path)
    }
}

/// Page-level metadata. `(document_id, page_number)` is unique and page
/// numbers are dense from 1 to `page_count`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentPage {
    pub id: Uuid,
    pub document_id: Uuid,
    /// 1-indexed.
    pub page_number: i32,
    /// Width in PDF points (72 ppi), post-rotation.
    pub width_points: f64,
    pub height_points: f64,
    /// One of 0, 90, 180, 270.
    pub rotation: i32,
    pub page_metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Section-aware text unit produced by chunking.
///
/// `stable_chunk_id` is globally unique and reproducible from
/// `(document_id, page_number, chunk_index)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub stable_chunk_id: String,
    pub page_number: i32,
    /// Index within the page.
    pub chunk_index: i32,
    pub section_type: Option<String>,
    pub effective_section_type: Option<String>,
    pub subsection_type: Option<String>,
    pub raw_text: String,
    pub token_count: i32,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    /// Effective section falls back to the classified section type.
    pub fn section(&self) -> Option<&str> {
        self.effective_section_type
            .as_deref()
            .or(self.section_type.as_deref())
    }
}

/// One OCR word with its page coordinates, in PDF point space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OcrWord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: i32,
    /// Reading order within the page.
    pub word_index: i32,
    pub text: String,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub confidence: Option<f64>,
}

/// Inclusive page span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: i32,
    pub end: i32,
}

impl PageRange {
    pub fn single(page: i32) -> Self {
        Self { start: page, end: page }
    }

    pub fn contains(&self, page: i32) -> bool {
        page >= self.start && page <= self.end
    }
}

/// Chunk provenance carried on a section extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceChunks {
    #[serde(default)]
    pub chunk_ids: Vec<Uuid>,
    #[serde(default)]
    pub stable_chunk_ids: Vec<String>,
}

/// Output of Tier-2 LLM extraction for one section on one document.
///
/// Uniquely keyed by `(document_id, workflow_id, section_type,
/// pipeline_run_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SectionExtraction {
    pub id: Uuid,
    pub document_id: Uuid,
    pub workflow_id: Uuid,
    pub pipeline_run_id: Option<Uuid>,
    pub section_type: String,
    /// Free-form structured map; includes an `entities` list when the
    /// extractor produced one.
    pub extracted_fields: JsonValue,
    #[sqlx(json)]
    pub page_range: PageRange,
    pub confidence: f64,
    #[sqlx(json)]
    pub source_chunks: SourceChunks,
    pub model_version: Option<String>,
    pub prompt_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SectionExtraction {
    /// The `entities` list from the extracted fields, if any.
    pub fn entities(&self) -> Option<&Vec<JsonValue>> {
        self.extracted_fields.get("entities").and_then(JsonValue::as_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_directories() {
        let doc = Document {
            id: Uuid::nil(),
            user_id: None,
            file_path: "/data/uploads/policy-2024.pdf".into(),
            mime_type: Some("application/pdf".into()),
            page_count: Some(12),
            status: DocumentStatus::Extracted,
            uploaded_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(doc.file_name(), "policy-2024.pdf");
    }

    #[test]
    fn page_range_contains_is_inclusive() {
        let range = PageRange { start: 2, end: 4 };
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn document_status_parse() {
        assert!(DocumentStatus::try_from("ocr_processed".to_string()).is_ok());
        assert!(DocumentStatus::try_from("indexed".to_string()).is_err());
    }
}
