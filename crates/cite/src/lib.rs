//! Citation mapping: verbatim source text to page/bbox spans.
//!
//! Tier 1 locates the quote as an exact OCR word subsequence and merges the
//! word boxes into per-line rectangles. Tier 2 embeds the quote with the
//! shared model and falls back to the closest chunk when no exact match
//! exists. All coordinates are PDF points (72 ppi), post-rotation, resolved
//! against `document_pages`.

pub mod mapper;
pub mod tier1;

pub use mapper::{parse_page_from_stable_id, CitationMapper, CitationRequest};
pub use tier1::{find_word_sequence, merge_word_boxes, normalize_text, normalize_token};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CiteError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Semantic(#[from] semantic::SemanticError),
    #[error("verbatim text must not be empty")]
    EmptyVerbatimText,
}
