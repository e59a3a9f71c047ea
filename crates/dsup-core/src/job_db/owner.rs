//! Exclusive ownership of a store file.
//!
//! Only the owner may recover interrupted rows or spawn downloaders for the
//! jobs in a store; a second owner would see the first one's running jobs as
//! interrupted and start them again. Readers (`dsup status`) need no lock.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::db::JobDb;
use super::error::{StoreError, StoreResult};

/// Held for as long as a manager drives the store. Dropping it releases the
/// lock; the lock file itself stays.
#[derive(Debug)]
pub struct OwnerLock {
    path: Option<PathBuf>,
    _file: Option<File>,
}

impl OwnerLock {
    /// Take ownership of the store behind `db`. In-memory stores are private
    /// to their pool and always succeed.
    pub fn acquire(db: &JobDb) -> StoreResult<Self> {
        let Some(db_path) = db.path() else {
            return Ok(Self {
                path: None,
                _file: None,
            });
        };
        let path = lock_path(db_path);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(StoreError::Lock)?;
        try_lock(&file, db_path)?;

        // Informational only; the flock is what counts.
        if let Err(e) = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
        {
            tracing::debug!(path = %path.display(), "write owner pid: {}", e);
        }
        tracing::debug!(path = %path.display(), "job store lock taken");
        Ok(Self {
            path: Some(path),
            _file: Some(file),
        })
    }

    /// Lock file path, or None for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// `<db file>.lock` next to the database.
fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(unix)]
fn try_lock(file: &File, db_path: &Path) -> StoreResult<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: flock(2) on a descriptor we own for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(StoreError::Busy(db_path.to_path_buf()))
    } else {
        Err(StoreError::Lock(err))
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File, _db_path: &Path) -> StoreResult<()> {
    Ok(())
}
