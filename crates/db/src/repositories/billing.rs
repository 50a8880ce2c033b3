use sqlx::Row;

use agroquote_core::domain::records::BillingDetails;

use super::{parse_timestamp, BillingCapture, BillingRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBillingRepository {
    pool: DbPool,
}

impl SqlBillingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BillingRepository for SqlBillingRepository {
    async fn append(&self, capture: BillingCapture) -> Result<(), RepositoryError> {
        let details = &capture.details;
        sqlx::query(
            "INSERT INTO billing_capture
                 (conversation_id, nit, business_name, plate, pickup_date, driver_name, captured_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&capture.conversation_id)
        .bind(&details.nit)
        .bind(&details.business_name)
        .bind(&details.plate)
        .bind(&details.pickup_date)
        .bind(&details.driver_name)
        .bind(capture.captured_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for(&self, conversation_id: &str) -> Result<Vec<BillingCapture>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT conversation_id, nit, business_name, plate, pickup_date, driver_name, captured_at
             FROM billing_capture WHERE conversation_id = ? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let captured_at: String = row.try_get("captured_at").map_err(RepositoryError::decode)?;
                Ok(BillingCapture {
                    conversation_id: row.try_get("conversation_id").map_err(RepositoryError::decode)?,
                    details: BillingDetails {
                        nit: row.try_get("nit").map_err(RepositoryError::decode)?,
                        business_name: row.try_get("business_name").map_err(RepositoryError::decode)?,
                        plate: row.try_get("plate").map_err(RepositoryError::decode)?,
                        pickup_date: row.try_get("pickup_date").map_err(RepositoryError::decode)?,
                        driver_name: row.try_get("driver_name").map_err(RepositoryError::decode)?,
                    },
                    captured_at: parse_timestamp(&captured_at)?,
                })
            })
            .collect()
    }
}
