//! Job read operations: list and get.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::JobDb;
use super::super::error::StoreResult;
use super::super::types::JobRecord;

const SELECT_COLUMNS: &str = r#"
    SELECT id, unique_id, active, failed, completed, isPaused,
           format_id, web_url, title, tracking_message
    FROM DownloadList
"#;

/// Decode one `DownloadList` row. Nullable text columns read as empty,
/// nullable flags as false.
fn record_from_row(row: &SqliteRow) -> Result<JobRecord, sqlx::Error> {
    let flag = |name: &str| -> Result<bool, sqlx::Error> {
        Ok(row.try_get::<Option<bool>, _>(name)?.unwrap_or(false))
    };
    let text = |name: &str| -> Result<String, sqlx::Error> {
        Ok(row.try_get::<Option<String>, _>(name)?.unwrap_or_default())
    };

    Ok(JobRecord {
        id: row.try_get("id")?,
        unique_id: row.try_get("unique_id")?,
        url: text("web_url")?,
        title: text("title")?,
        tracking_message: text("tracking_message")?,
        format_id: text("format_id")?,
        active: flag("active")?,
        completed: flag("completed")?,
        failed: flag("failed")?,
        is_paused: flag("isPaused")?,
    })
}

impl JobDb {
    /// List jobs newest first (by `id` descending), at most `limit` rows.
    pub async fn list(&self, limit: u32) -> StoreResult<Vec<JobRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(record_from_row(row)?);
        }
        Ok(out)
    }

    /// Fetch a single job by its `unique_id`.
    pub async fn get(&self, unique_id: &str) -> StoreResult<Option<JobRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE unique_id = ?1");
        let row = sqlx::query(&sql)
            .bind(unique_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(record_from_row(&row)?)),
            None => Ok(None),
        }
    }
}
