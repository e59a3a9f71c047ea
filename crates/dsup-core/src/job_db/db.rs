//! SQLite-backed job store: connection and migrations. Row CRUD lives in `jobs`.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};

use crate::config;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the job store.
///
/// The database file is stored under the XDG state directory:
/// `~/.local/state/dsup/dsup.db` on Debian.
#[derive(Clone)]
pub struct JobDb {
    pub(crate) pool: Pool<Sqlite>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for JobDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JobDb {
    /// Open (or create) the default job store and run migrations.
    pub async fn open_default() -> Result<Self> {
        let state_dir = config::state_dir()?;
        Self::open_at(state_dir.join("dsup.db")).await
    }

    /// Open (or create) the store at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let db = JobDb {
            pool,
            path: Some(path.to_path_buf()),
        };
        db.migrate().await?;
        tracing::debug!(path = %path.display(), "job store opened");
        Ok(db)
    }

    /// Database file, or None for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close every pooled connection. Later operations fail as unavailable.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        // Column names (including `web_url` and `isPaused`) are the on-disk
        // format shared with other readers of this file; keep them stable.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS DownloadList (
                id INTEGER PRIMARY KEY,
                unique_id TEXT NOT NULL UNIQUE,
                active BOOLEAN DEFAULT 1,
                failed BOOLEAN DEFAULT 0,
                completed BOOLEAN DEFAULT 0,
                format_id TEXT,
                web_url TEXT,
                title TEXT,
                tracking_message TEXT,
                isPaused BOOLEAN DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
/// Open an in-memory store for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<JobDb> {
    // Single connection to avoid the pool handing back a different empty DB.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = JobDb { pool, path: None };
    db.migrate().await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_uri_escapes_special_chars() {
        let uri = path_to_sqlite_uri(Path::new("/tmp/my dir/#1?/a&b%.db"));
        assert_eq!(uri, "sqlite:///tmp/my%20dir/%231%3F/a%26b%25.db");
    }
}
