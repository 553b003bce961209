//! Directed relationships between canonical entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Closed vocabulary of relationship types.
///
/// Anything outside this set coming back from the LLM is discarded with a
/// warning at the extraction layer; rows in the store always parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    IssuedBy,
    HasInsured,
    BrokeredBy,
    HasCoverage,
    SubjectTo,
    Excludes,
    HasLocation,
    HasClaim,
    ModifiedBy,
    DefinedIn,
    // Fixed extension set.
    HasCondition,
    HasExclusion,
    HasEndorsement,
    Covers,
    References,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 15] = [
        RelationshipType::IssuedBy,
        RelationshipType::HasInsured,
        RelationshipType::BrokeredBy,
        RelationshipType::HasCoverage,
        RelationshipType::SubjectTo,
        RelationshipType::Excludes,
        RelationshipType::HasLocation,
        RelationshipType::HasClaim,
        RelationshipType::ModifiedBy,
        RelationshipType::DefinedIn,
        RelationshipType::HasCondition,
        RelationshipType::HasExclusion,
        RelationshipType::HasEndorsement,
        RelationshipType::Covers,
        RelationshipType::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::IssuedBy => "ISSUED_BY",
            RelationshipType::HasInsured => "HAS_INSURED",
            RelationshipType::BrokeredBy => "BROKERED_BY",
            RelationshipType::HasCoverage => "HAS_COVERAGE",
            RelationshipType::SubjectTo => "SUBJECT_TO",
            RelationshipType::Excludes => "EXCLUDES",
            RelationshipType::HasLocation => "HAS_LOCATION",
            RelationshipType::HasClaim => "HAS_CLAIM",
            RelationshipType::ModifiedBy => "MODIFIED_BY",
            RelationshipType::DefinedIn => "DEFINED_IN",
            RelationshipType::HasCondition => "HAS_CONDITION",
            RelationshipType::HasExclusion => "HAS_EXCLUSION",
            RelationshipType::HasEndorsement => "HAS_ENDORSEMENT",
            RelationshipType::Covers => "COVERS",
            RelationshipType::References => "REFERENCES",
        }
    }

    /// Parse a relationship type after upper-casing and `-`/space sanitization.
    pub fn parse(raw: &str) -> Result<Self, crate::DomainError> {
        let normalized = sanitize_relationship_type(raw);
        RelationshipType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or(crate::DomainError::UnknownRelationshipType(normalized))
    }

    /// Whether self-loops are allowed for this type. Only `References` is
    /// reflexive (a definition may reference itself through its own term).
    pub fn is_reflexive(&self) -> bool {
        matches!(self, RelationshipType::References)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RelationshipType {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RelationshipType::parse(&value)
    }
}

/// Upper-case and map every non-alphanumeric run to `_`, the form used both
/// for vocabulary matching and for graph-store edge type names.
pub fn sanitize_relationship_type(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    if out.ends_with('_') {
        out.pop();
    }
    out
}

/// Directed, evidence-bound edge between two canonical entities.
///
/// Invariant: `attributes.evidence` has at least one element for every
/// persisted row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntityRelationship {
    pub id: Uuid,
    pub document_id: Option<Uuid>,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    #[sqlx(try_from = "String")]
    pub relationship_type: RelationshipType,
    pub confidence: f64,
    /// Carries `evidence[]` plus extraction provenance
    /// (`extraction_batch`, `extraction_sections`).
    pub attributes: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl EntityRelationship {
    pub fn evidence(&self) -> Vec<JsonValue> {
        self.attributes
            .get("evidence")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_loose_forms() {
        assert_eq!(
            RelationshipType::parse("has coverage").unwrap(),
            RelationshipType::HasCoverage
        );
        assert_eq!(
            RelationshipType::parse("issued-by").unwrap(),
            RelationshipType::IssuedBy
        );
        assert_eq!(
            RelationshipType::parse("EXCLUDES").unwrap(),
            RelationshipType::Excludes
        );
    }

    #[test]
    fn parse_rejects_out_of_vocabulary() {
        assert!(RelationshipType::parse("LOVES").is_err());
        assert!(RelationshipType::parse("").is_err());
    }

    #[test]
    fn sanitize_collapses_separator_runs() {
        assert_eq!(sanitize_relationship_type("has -- coverage"), "HAS_COVERAGE");
        assert_eq!(sanitize_relationship_type("  issued_by  "), "ISSUED_BY");
        assert_eq!(sanitize_relationship_type("covers!"), "COVERS");
    }

    #[test]
    fn only_references_is_reflexive() {
        for ty in RelationshipType::ALL {
            assert_eq!(ty.is_reflexive(), ty == RelationshipType::References);
        }
    }
}
