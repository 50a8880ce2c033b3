use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use agroquote_core::domain::catalog::Unit;
use agroquote_core::domain::records::{QuoteLine, QuoteRecord};

use super::{parse_timestamp, QuoteRecordRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuoteRecordRepository {
    pool: DbPool,
}

impl SqlQuoteRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn unit_as_str(unit: Unit) -> &'static str {
    match unit {
        Unit::Liter => "liter",
        Unit::Kilogram => "kilogram",
        Unit::Unit => "unit",
    }
}

fn parse_unit(raw: &str) -> Result<Unit, RepositoryError> {
    match raw {
        "liter" => Ok(Unit::Liter),
        "kilogram" => Ok(Unit::Kilogram),
        "unit" => Ok(Unit::Unit),
        other => Err(RepositoryError::Decode(format!("unknown unit `{other}`"))),
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(RepositoryError::decode)
}

fn parse_optional_decimal(raw: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    raw.as_deref().map(parse_decimal).transpose()
}

fn split_crops(raw: &str) -> Vec<String> {
    raw.split(", ").map(str::trim).filter(|crop| !crop.is_empty()).map(str::to_string).collect()
}

fn row_to_line(row: &sqlx::sqlite::SqliteRow) -> Result<QuoteLine, RepositoryError> {
    let quantity: String = row.try_get("quantity").map_err(RepositoryError::decode)?;
    let unit: String = row.try_get("unit").map_err(RepositoryError::decode)?;

    Ok(QuoteLine {
        sku: row.try_get("sku").map_err(RepositoryError::decode)?,
        product_name: row.try_get("product_name").map_err(RepositoryError::decode)?,
        variant: row.try_get("variant").map_err(RepositoryError::decode)?,
        quantity: parse_decimal(&quantity)?,
        unit: parse_unit(&unit)?,
        unit_price: parse_optional_decimal(
            row.try_get("unit_price").map_err(RepositoryError::decode)?,
        )?,
        line_total: parse_optional_decimal(
            row.try_get("line_total").map_err(RepositoryError::decode)?,
        )?,
    })
}

#[async_trait::async_trait]
impl QuoteRecordRepository for SqlQuoteRecordRepository {
    /// Header and lines go in one transaction.
    async fn append(&self, record: QuoteRecord) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO quote_record (id, conversation_id, customer_name, department, subzone,
                                       crops, hectares, season, total, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.conversation_id)
        .bind(&record.customer_name)
        .bind(&record.department)
        .bind(&record.subzone)
        .bind(record.crops.join(", "))
        .bind(&record.hectares)
        .bind(&record.season)
        .bind(record.total.map(|total| total.to_string()))
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, line) in record.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO quote_record_line (quote_id, position, sku, product_name, variant,
                                                quantity, unit, unit_price, line_total)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.id)
            .bind(position as i64)
            .bind(&line.sku)
            .bind(&line.product_name)
            .bind(&line.variant)
            .bind(line.quantity.to_string())
            .bind(unit_as_str(line.unit))
            .bind(line.unit_price.map(|price| price.to_string()))
            .bind(line.line_total.map(|total| total.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for(&self, conversation_id: &str) -> Result<Vec<QuoteRecord>, RepositoryError> {
        let headers = sqlx::query(
            "SELECT id, conversation_id, customer_name, department, subzone, crops, hectares,
                    season, total, created_at
             FROM quote_record WHERE conversation_id = ? ORDER BY created_at, id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(headers.len());
        for header in &headers {
            let id: String = header.try_get("id").map_err(RepositoryError::decode)?;
            let lines = sqlx::query(
                "SELECT sku, product_name, variant, quantity, unit, unit_price, line_total
                 FROM quote_record_line WHERE quote_id = ? ORDER BY position",
            )
            .bind(&id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_line)
            .collect::<Result<Vec<_>, _>>()?;

            let crops: String = header.try_get("crops").map_err(RepositoryError::decode)?;
            let created_at: String = header.try_get("created_at").map_err(RepositoryError::decode)?;
            records.push(QuoteRecord {
                id,
                conversation_id: header.try_get("conversation_id").map_err(RepositoryError::decode)?,
                customer_name: header.try_get("customer_name").map_err(RepositoryError::decode)?,
                department: header.try_get("department").map_err(RepositoryError::decode)?,
                subzone: header.try_get("subzone").map_err(RepositoryError::decode)?,
                crops: split_crops(&crops),
                hectares: header.try_get("hectares").map_err(RepositoryError::decode)?,
                season: header.try_get("season").map_err(RepositoryError::decode)?,
                lines,
                total: parse_optional_decimal(header.try_get("total").map_err(RepositoryError::decode)?)?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(records)
    }
}
