//! Batched multi-section LLM extraction.
//!
//! One LLM call extracts every detected section type (coverages, conditions,
//! exclusions) from pre-grouped chunk text, instead of one call per section.
//! Output is validated against the fixed per-section field lists; unknown
//! fields survive under `additional_data`.

pub mod schema;
pub mod service;

pub use schema::{known_fields, validate_section_items};
pub use service::{SectionBatchExtractor, SectionChunkInput};

use thiserror::Error;

/// Version persisted with each extraction alongside the model version.
pub const SECTION_PROMPT_VERSION: &str = "sections-v1";

/// System prompt shipped as a versioned resource.
pub const SECTION_EXTRACTION_PROMPT: &str = include_str!("../prompts/section_extraction.md");

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Llm(#[from] llm::LlmError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error("no sections provided for extraction")]
    EmptyInput,
}
