//! Repositories for first-class tables and their materialized children.

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{DocumentTable, LossRunClaim, SovItem, TableType};

use crate::error::StoreResult;

#[derive(Clone)]
pub struct DocumentTableRepository {
    pool: PgPool,
}

impl DocumentTableRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        document_id: Uuid,
        page_number: i32,
        table_index: i32,
        table_type: &TableType,
        table_json: JsonValue,
        num_rows: i32,
        num_cols: i32,
        canonical_headers: Option<JsonValue>,
        classification_confidence: Option<f64>,
        raw_markdown: Option<&str>,
    ) -> StoreResult<DocumentTable> {
        let stable_table_id = domain::stable_table_id(document_id, page_number, table_index);
        let row = sqlx::query_as::<_, DocumentTable>(
            r#"
            INSERT INTO document_tables
                (id, document_id, stable_table_id, page_number, table_index, table_type,
                 table_json, num_rows, num_cols, canonical_headers, classification_confidence,
                 raw_markdown, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (stable_table_id) DO UPDATE SET
                table_type = EXCLUDED.table_type,
                table_json = EXCLUDED.table_json,
                num_rows = EXCLUDED.num_rows,
                num_cols = EXCLUDED.num_cols,
                canonical_headers = EXCLUDED.canonical_headers,
                classification_confidence = EXCLUDED.classification_confidence,
                raw_markdown = EXCLUDED.raw_markdown
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(stable_table_id)
        .bind(page_number)
        .bind(table_index)
        .bind(table_type.as_str())
        .bind(table_json)
        .bind(num_rows)
        .bind(num_cols)
        .bind(canonical_headers)
        .bind(classification_confidence)
        .bind(raw_markdown)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_document(&self, document_id: Uuid) -> StoreResult<Vec<DocumentTable>> {
        let rows = sqlx::query_as::<_, DocumentTable>(
            "SELECT * FROM document_tables WHERE document_id = $1 ORDER BY page_number, table_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_sov_items(&self, document_id: Uuid) -> StoreResult<Vec<SovItem>> {
        let rows = sqlx::query_as::<_, SovItem>(
            "SELECT * FROM sov_items WHERE document_id = $1 ORDER BY created_at",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_loss_run_claims(&self, document_id: Uuid) -> StoreResult<Vec<LossRunClaim>> {
        let rows = sqlx::query_as::<_, LossRunClaim>(
            "SELECT * FROM loss_run_claims WHERE document_id = $1 ORDER BY created_at",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_sov_item(
        &self,
        document_id: Uuid,
        document_table_id: Option<Uuid>,
        location_number: Option<&str>,
        building_number: Option<&str>,
        description: Option<&str>,
        address: Option<&str>,
        construction_type: Option<&str>,
        occupancy: Option<&str>,
        year_built: Option<i32>,
        square_footage: Option<i32>,
        building_limit: Option<f64>,
        contents_limit: Option<f64>,
        bi_limit: Option<f64>,
        total_insured_value: Option<f64>,
    ) -> StoreResult<SovItem> {
        let row = sqlx::query_as::<_, SovItem>(
            r#"
            INSERT INTO sov_items
                (id, document_id, document_table_id, location_number, building_number,
                 description, address, construction_type, occupancy, year_built,
                 square_footage, building_limit, contents_limit, bi_limit,
                 total_insured_value, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(document_table_id)
        .bind(location_number)
        .bind(building_number)
        .bind(description)
        .bind(address)
        .bind(construction_type)
        .bind(occupancy)
        .bind(year_built)
        .bind(square_footage)
        .bind(building_limit)
        .bind(contents_limit)
        .bind(bi_limit)
        .bind(total_insured_value)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_loss_run_claim(
        &self,
        document_id: Uuid,
        document_table_id: Option<Uuid>,
        claim_number: Option<&str>,
        policy_number: Option<&str>,
        insured_name: Option<&str>,
        loss_date: Option<NaiveDate>,
        report_date: Option<NaiveDate>,
        cause_of_loss: Option<&str>,
        description: Option<&str>,
        incurred_amount: Option<f64>,
        paid_amount: Option<f64>,
        reserve_amount: Option<f64>,
        status: Option<&str>,
    ) -> StoreResult<LossRunClaim> {
        let row = sqlx::query_as::<_, LossRunClaim>(
            r#"
            INSERT INTO loss_run_claims
                (id, document_id, document_table_id, claim_number, policy_number, insured_name,
                 loss_date, report_date, cause_of_loss, description, incurred_amount,
                 paid_amount, reserve_amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(document_table_id)
        .bind(claim_number)
        .bind(policy_number)
        .bind(insured_name)
        .bind(loss_date)
        .bind(report_date)
        .bind(cause_of_loss)
        .bind(description)
        .bind(incurred_amount)
        .bind(paid_amount)
        .bind(reserve_amount)
        .bind(status)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
