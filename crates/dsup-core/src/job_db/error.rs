//! Error type for job store operations.

/// Failure of a job store call.
///
/// `RowNotFound` is expected when the in-memory view is ahead of or behind
/// the store; callers log it and move on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be opened or queried.
    #[error("job store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    /// A row with the same `unique_id` (or numeric `id`) already exists.
    #[error("job {0} already exists")]
    DuplicateKey(String),
    /// Another manager already owns the store file.
    #[error("job store {} is in use by another dsup process", .0.display())]
    Busy(std::path::PathBuf),
    /// The owner lock file could not be created or locked.
    #[error("lock job store: {0}")]
    Lock(#[source] std::io::Error),
    /// No row matched the `unique_id` of an update.
    #[error("no stored job with id {0}")]
    RowNotFound(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
