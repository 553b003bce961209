//! Citations: spans of verbatim source text with page coordinates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::document::PageRange;

/// Axis-aligned rectangle in PDF point space (72 ppi), post-rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Clamp into `[0, width] x [0, height]`.
    pub fn clamped(&self, width: f64, height: f64) -> BoundingBox {
        BoundingBox {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }

    pub fn fits_within(&self, width: f64, height: f64) -> bool {
        self.x0 >= 0.0 && self.y0 >= 0.0 && self.x1 <= width && self.y1 <= height
    }
}

/// All boxes for one page of a citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationSpan {
    pub page_number: i32,
    pub bounding_boxes: Vec<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
}

/// How the citation span was located in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Tier1ExactMatch,
    Tier2Semantic,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Tier1ExactMatch => "tier1_exact_match",
            ExtractionMethod::Tier2Semantic => "tier2_semantic",
        }
    }
}

impl TryFrom<String> for ExtractionMethod {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "tier1_exact_match" => Ok(ExtractionMethod::Tier1ExactMatch),
            "tier2_semantic" => Ok(ExtractionMethod::Tier2Semantic),
            other => Err(crate::DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span of verbatim source text for a cited item.
///
/// `(document_id, source_type, source_id)` is unique; re-runs overwrite the
/// spans and verbatim text. Every bbox lies within its page dimensions after
/// rotation normalization.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Citation {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Kind of the cited item (e.g. `coverage`, `relationship`, `entity`).
    pub source_type: String,
    /// Canonical id of the cited item.
    pub source_id: String,
    #[sqlx(json)]
    pub spans: Vec<CitationSpan>,
    pub verbatim_text: String,
    pub primary_page: i32,
    #[sqlx(json)]
    pub page_range: PageRange,
    pub extraction_confidence: f64,
    #[sqlx(try_from = "String")]
    pub extraction_method: ExtractionMethod,
    pub clause_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_union_covers_both() {
        let a = BoundingBox { x0: 10.0, y0: 10.0, x1: 20.0, y1: 20.0 };
        let b = BoundingBox { x0: 15.0, y0: 5.0, x1: 30.0, y1: 18.0 };
        let u = a.union(&b);
        assert_eq!(u, BoundingBox { x0: 10.0, y0: 5.0, x1: 30.0, y1: 20.0 });
    }

    #[test]
    fn bbox_clamp_respects_page() {
        let b = BoundingBox { x0: -5.0, y0: 10.0, x1: 700.0, y1: 900.0 };
        let c = b.clamped(612.0, 792.0);
        assert!(c.fits_within(612.0, 792.0));
        assert_eq!(c.x0, 0.0);
        assert_eq!(c.x1, 612.0);
        assert_eq!(c.y1, 792.0);
    }
}
