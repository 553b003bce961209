//! First-class tables and their materialized children.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Classified table kind; routing into relationship batches keys off this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TableType {
    PropertySov,
    LossRun,
    PremiumSchedule,
    CoverageSchedule,
    Other(String),
}

impl TableType {
    pub fn as_str(&self) -> &str {
        match self {
            TableType::PropertySov => "property_sov",
            TableType::LossRun => "loss_run",
            TableType::PremiumSchedule => "premium_schedule",
            TableType::CoverageSchedule => "coverage_schedule",
            TableType::Other(name) => name.as_str(),
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "property_sov" => TableType::PropertySov,
            "loss_run" => TableType::LossRun,
            "premium_schedule" => TableType::PremiumSchedule,
            "coverage_schedule" => TableType::CoverageSchedule,
            other => TableType::Other(other.to_string()),
        }
    }
}

impl From<String> for TableType {
    fn from(value: String) -> Self {
        TableType::parse(&value)
    }
}

impl From<TableType> for String {
    fn from(value: TableType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted table with structured rows/cells/headers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentTable {
    pub id: Uuid,
    pub document_id: Uuid,
    pub stable_table_id: String,
    pub page_number: i32,
    pub table_index: i32,
    #[sqlx(try_from = "String")]
    pub table_type: TableType,
    pub table_json: JsonValue,
    pub num_rows: i32,
    pub num_cols: i32,
    pub canonical_headers: Option<JsonValue>,
    pub classification_confidence: Option<f64>,
    pub raw_markdown: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of a statement-of-values table, materialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SovItem {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_table_id: Option<Uuid>,
    pub location_number: Option<String>,
    pub building_number: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub construction_type: Option<String>,
    pub occupancy: Option<String>,
    pub year_built: Option<i32>,
    pub square_footage: Option<i32>,
    pub building_limit: Option<f64>,
    pub contents_limit: Option<f64>,
    pub bi_limit: Option<f64>,
    pub total_insured_value: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// One claim row of a loss-run table, materialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LossRunClaim {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_table_id: Option<Uuid>,
    pub claim_number: Option<String>,
    pub policy_number: Option<String>,
    pub insured_name: Option<String>,
    pub loss_date: Option<NaiveDate>,
    pub report_date: Option<NaiveDate>,
    pub cause_of_loss: Option<String>,
    pub description: Option<String>,
    pub incurred_amount: Option<f64>,
    pub paid_amount: Option<f64>,
    pub reserve_amount: Option<f64>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_type_round_trip() {
        assert_eq!(TableType::parse("property_sov"), TableType::PropertySov);
        assert_eq!(
            TableType::parse("vehicle_schedule"),
            TableType::Other("vehicle_schedule".to_string())
        );
        assert_eq!(TableType::LossRun.as_str(), "loss_run");
    }
}
