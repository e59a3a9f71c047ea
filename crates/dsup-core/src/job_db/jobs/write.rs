//! Job write operations: insert, partial update, recovery, clear.

use sqlx::{QueryBuilder, Sqlite};

use super::super::db::JobDb;
use super::super::error::{StoreError, StoreResult};
use super::super::types::{JobPatch, JobRecord};

impl JobDb {
    /// Insert a new job row.
    ///
    /// Fails with `DuplicateKey` if the `unique_id` or the numeric `id` is
    /// already taken; the caller regenerates ids and retries.
    pub async fn insert(&self, job: &JobRecord) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            INSERT INTO DownloadList (
                id, unique_id, active, failed, completed,
                format_id, web_url, title, tracking_message, isPaused
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(job.id)
        .bind(&job.unique_id)
        .bind(job.active)
        .bind(job.failed)
        .bind(job.completed)
        .bind(&job.format_id)
        .bind(&job.url)
        .bind(&job.title)
        .bind(&job.tracking_message)
        .bind(job.is_paused)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateKey(job.unique_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Update only the fields present in `patch` for the job `unique_id`.
    ///
    /// An empty patch is a no-op. Returns `RowNotFound` when no row matches.
    pub async fn update_fields(&self, unique_id: &str, patch: &JobPatch) -> StoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE DownloadList SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(title) = &patch.title {
                set.push("title = ");
                set.push_bind_unseparated(title.clone());
            }
            if let Some(msg) = &patch.tracking_message {
                set.push("tracking_message = ");
                set.push_bind_unseparated(msg.clone());
            }
            if let Some(format_id) = &patch.format_id {
                set.push("format_id = ");
                set.push_bind_unseparated(format_id.clone());
            }
            if let Some(status) = patch.status {
                let f = status.flags();
                set.push("active = ");
                set.push_bind_unseparated(f.active);
                set.push("completed = ");
                set.push_bind_unseparated(f.completed);
                set.push("failed = ");
                set.push_bind_unseparated(f.failed);
                set.push("isPaused = ");
                set.push_bind_unseparated(f.is_paused);
            }
        }
        qb.push(" WHERE unique_id = ");
        qb.push_bind(unique_id.to_string());

        let affected = qb.build().execute(&self.pool).await?.rows_affected();
        if affected == 0 {
            return Err(StoreError::RowNotFound(unique_id.to_string()));
        }
        Ok(())
    }

    /// Mark every job still flagged active as paused.
    ///
    /// Active rows at startup belong to processes that died with the previous
    /// session; paused rows can be resumed. Returns the number of rows reset.
    pub async fn recover_interrupted(&self) -> StoreResult<u64> {
        let r = sqlx::query(
            r#"
            UPDATE DownloadList
            SET active = 0,
                isPaused = 1,
                completed = 0,
                failed = 0,
                tracking_message = 'Interrupted'
            WHERE active = 1
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Delete every job row. Returns the number of rows removed.
    pub async fn clear_all(&self) -> StoreResult<u64> {
        let r = sqlx::query("DELETE FROM DownloadList")
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}
