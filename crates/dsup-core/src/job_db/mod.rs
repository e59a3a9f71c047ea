//! Persistent job store (SQLite via sqlx).
//!
//! One row per download job in the `DownloadList` table, keyed by the job's
//! `unique_id`, ordered by its numeric `id`.

mod db;
mod error;
mod ids;
mod owner;
mod types;

mod jobs {
    mod read;
    mod write;
}

pub use db::JobDb;
pub use error::{StoreError, StoreResult};
pub use ids::{new_row_id, new_unique_id, UNIQUE_ID_LEN};
pub use owner::OwnerLock;
pub use types::{JobPatch, JobRecord, JobStatus, StatusFlags, DEFAULT_FORMAT_ID};

#[cfg(test)]
pub(crate) use db::open_memory;
