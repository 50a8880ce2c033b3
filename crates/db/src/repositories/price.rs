use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use agroquote_core::domain::records::{PriceEntry, PriceList};

use super::{PriceRepository, RepositoryError};
use crate::DbPool;

/// Price list table. An empty `variant` column is the product-wide price.
pub struct SqlPriceRepository {
    pool: DbPool,
}

impl SqlPriceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PriceRepository for SqlPriceRepository {
    async fn load(&self) -> Result<PriceList, RepositoryError> {
        let rows = sqlx::query(
            "SELECT sku, variant, unit_price, currency FROM price_entry ORDER BY sku, variant",
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(|row| {
                let variant: String = row.try_get("variant").map_err(RepositoryError::decode)?;
                let unit_price: String = row.try_get("unit_price").map_err(RepositoryError::decode)?;
                Ok(PriceEntry {
                    sku: row.try_get("sku").map_err(RepositoryError::decode)?,
                    variant: Some(variant).filter(|variant| !variant.is_empty()),
                    unit_price: Decimal::from_str(&unit_price).map_err(RepositoryError::decode)?,
                    currency: row.try_get("currency").map_err(RepositoryError::decode)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        Ok(PriceList::new(entries))
    }

    async fn replace(&self, prices: PriceList) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM price_entry").execute(&mut *tx).await?;

        for entry in prices.entries() {
            sqlx::query(
                "INSERT INTO price_entry (sku, variant, unit_price, currency)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(sku, variant) DO UPDATE SET
                     unit_price = excluded.unit_price,
                     currency = excluded.currency",
            )
            .bind(&entry.sku)
            .bind(entry.variant.as_deref().unwrap_or(""))
            .bind(entry.unit_price.to_string())
            .bind(&entry.currency)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
