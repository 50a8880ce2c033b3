use chrono::{DateTime, Utc};
use sqlx::Row;

use agroquote_core::domain::records::HistoryRow;
use agroquote_core::domain::session::Role;

use super::{parse_timestamp, HistoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryRow, RepositoryError> {
    let role: String = row.try_get("role").map_err(RepositoryError::decode)?;
    let recorded_at: String = row.try_get("recorded_at").map_err(RepositoryError::decode)?;

    Ok(HistoryRow {
        conversation_id: row.try_get("conversation_id").map_err(RepositoryError::decode)?,
        role: Role::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role}`")))?,
        content: row.try_get("content").map_err(RepositoryError::decode)?,
        recorded_at: parse_timestamp(&recorded_at)?,
    })
}

#[async_trait::async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn append(&self, row: HistoryRow) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_history (conversation_id, role, content, recorded_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&row.conversation_id)
        .bind(row.role.as_str())
        .bind(&row.content)
        .bind(row.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for(&self, conversation_id: &str) -> Result<Vec<HistoryRow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT conversation_id, role, content, recorded_at
             FROM chat_history WHERE conversation_id = ? ORDER BY id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_history WHERE recorded_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
