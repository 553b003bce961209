//! Canonical entities, mentions, and evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Kind of real-world entity extracted from an insurance document.
///
/// The structural path of the pipeline matches on the known variants;
/// anything novel the LLM produces is carried through as [`EntityType::Other`]
/// with its attributes left free-form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Policy,
    Organization,
    Coverage,
    Exclusion,
    Condition,
    Endorsement,
    Location,
    Claim,
    Definition,
    Vehicle,
    Driver,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Policy => "Policy",
            EntityType::Organization => "Organization",
            EntityType::Coverage => "Coverage",
            EntityType::Exclusion => "Exclusion",
            EntityType::Condition => "Condition",
            EntityType::Endorsement => "Endorsement",
            EntityType::Location => "Location",
            EntityType::Claim => "Claim",
            EntityType::Definition => "Definition",
            EntityType::Vehicle => "Vehicle",
            EntityType::Driver => "Driver",
            EntityType::Other(name) => name.as_str(),
        }
    }

    /// Case-insensitive parse; unknown names round-trip through `Other`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "policy" => EntityType::Policy,
            "organization" => EntityType::Organization,
            "coverage" => EntityType::Coverage,
            "exclusion" => EntityType::Exclusion,
            "condition" => EntityType::Condition,
            "endorsement" => EntityType::Endorsement,
            "location" => EntityType::Location,
            "claim" => EntityType::Claim,
            "definition" => EntityType::Definition,
            "vehicle" => EntityType::Vehicle,
            "driver" => EntityType::Driver,
            _ => EntityType::Other(name.to_string()),
        }
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        EntityType::parse(&value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a piece of evidence binding a canonical entity to a mention came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Extracted,
    Inferred,
    HumanVerified,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Extracted => "extracted",
            EvidenceType::Inferred => "inferred",
            EvidenceType::HumanVerified => "human_verified",
        }
    }
}

impl TryFrom<String> for EvidenceType {
    type Error = crate::DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "extracted" => Ok(EvidenceType::Extracted),
            "inferred" => Ok(EvidenceType::Inferred),
            "human_verified" => Ok(EvidenceType::HumanVerified),
            other => Err(crate::DomainError::UnknownEvidenceType(other.to_string())),
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document-scoped occurrence of an entity.
///
/// Always tied to exactly one document; a mention may carry zero or more
/// evidence links once resolution has run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntityMention {
    pub id: Uuid,
    pub document_id: Uuid,
    #[sqlx(try_from = "String")]
    pub entity_type: EntityType,
    pub mention_text: String,
    /// Includes `normalized_value` and all raw attributes from extraction.
    pub extracted_fields: JsonValue,
    pub confidence: f64,
    pub source_document_chunk_id: Option<Uuid>,
    pub source_stable_chunk_id: Option<String>,
    pub section_extraction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl EntityMention {
    /// The normalized value recorded at extraction time, falling back to the
    /// mention text itself.
    pub fn normalized_value(&self) -> String {
        self.extracted_fields
            .get("normalized_value")
            .and_then(JsonValue::as_str)
            .unwrap_or(&self.mention_text)
            .to_string()
    }
}

/// Deduplicated identity of a real-world entity.
///
/// `(entity_type, canonical_key)` is globally unique. Attributes are
/// monotonically enriched: description-like keys may only be replaced by a
/// strictly longer string, ordinary keys are set once.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalEntity {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub entity_type: EntityType,
    pub canonical_key: String,
    pub attributes: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalEntity {
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(JsonValue::as_str)
    }

    /// The normalized value stored in attributes at creation time.
    pub fn normalized_value(&self) -> Option<&str> {
        self.attribute_str("normalized_value")
    }
}

/// M:N binding of a canonical entity to one mention on one document.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntityEvidence {
    pub id: Uuid,
    pub canonical_entity_id: Uuid,
    pub entity_mention_id: Uuid,
    pub document_id: Uuid,
    pub confidence: f64,
    #[sqlx(try_from = "String")]
    pub evidence_type: EvidenceType,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_parse_round_trip() {
        assert_eq!(EntityType::parse("policy"), EntityType::Policy);
        assert_eq!(EntityType::parse("Coverage"), EntityType::Coverage);
        assert_eq!(
            EntityType::parse("Peril"),
            EntityType::Other("Peril".to_string())
        );
        assert_eq!(EntityType::Other("Peril".into()).as_str(), "Peril");
    }

    #[test]
    fn evidence_type_rejects_unknown() {
        assert!(EvidenceType::try_from("extracted".to_string()).is_ok());
        assert!(EvidenceType::try_from("guessed".to_string()).is_err());
    }
}
