use chrono::Utc;
use sqlx::Row;

use agroquote_core::domain::records::ClientRecord;

use super::{ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Result<ClientRecord, RepositoryError> {
    Ok(ClientRecord {
        phone: row.try_get("phone").map_err(RepositoryError::decode)?,
        name: row.try_get("name").map_err(RepositoryError::decode)?,
        department: row.try_get("department").map_err(RepositoryError::decode)?,
        subzone: row.try_get("subzone").map_err(RepositoryError::decode)?,
        crop: row.try_get("crop").map_err(RepositoryError::decode)?,
        hectares: row.try_get("hectares").map_err(RepositoryError::decode)?,
        season: row.try_get("season").map_err(RepositoryError::decode)?,
    })
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<ClientRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT phone, name, department, subzone, crop, hectares, season
             FROM client WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_client).transpose()
    }

    /// Known fields are kept when the new record leaves them empty.
    async fn upsert(&self, record: ClientRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO client (phone, name, department, subzone, crop, hectares, season, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(phone) DO UPDATE SET
                 name = COALESCE(excluded.name, client.name),
                 department = COALESCE(excluded.department, client.department),
                 subzone = COALESCE(excluded.subzone, client.subzone),
                 crop = COALESCE(excluded.crop, client.crop),
                 hectares = COALESCE(excluded.hectares, client.hectares),
                 season = COALESCE(excluded.season, client.season),
                 updated_at = excluded.updated_at",
        )
        .bind(&record.phone)
        .bind(&record.name)
        .bind(&record.department)
        .bind(&record.subzone)
        .bind(&record.crop)
        .bind(&record.hectares)
        .bind(&record.season)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
