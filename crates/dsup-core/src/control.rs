//! Control API: start, pause, resume, clear and list download jobs.
//!
//! `DownloadManager` ties the job store, the in-memory board, the process
//! registry and the supervisor together. No operation returns an error:
//! failures are logged and whole-list failures land in the board's error slot
//! (see [`DownloadManager::last_error`]).
//!
//! A manager owns its store file exclusively (see [`OwnerLock`]) for as long
//! as it lives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::board::{JobBoard, Snapshot};
use crate::config::DsupConfig;
use crate::job_db::{JobDb, JobRecord, OwnerLock, StoreError, StoreResult};
use crate::registry::ProcessRegistry;
use crate::supervisor::{Launcher, Supervisor, YtDlpLauncher};

/// Error slot message when the job list cannot be loaded.
pub const LOAD_FAILED: &str = "Failed to load download history";
/// Error slot message when a new job cannot be stored.
pub const START_FAILED: &str = "Failed to start download";
/// Error slot message when the store cannot be cleared.
pub const CLEAR_FAILED: &str = "Failed to clear download history";

/// Fresh ids are drawn this many times before a start gives up on collisions.
const INSERT_ATTEMPTS: usize = 3;

/// Runtime knobs taken from the config file.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Rows loaded into the board on refresh.
    pub list_limit: u32,
    /// Time between SIGTERM and SIGKILL when pausing.
    pub kill_grace: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&DsupConfig::default())
    }
}

impl ManagerSettings {
    pub fn from_config(cfg: &DsupConfig) -> Self {
        Self {
            list_limit: cfg.list_limit,
            kill_grace: Duration::from_secs(cfg.kill_grace_secs),
        }
    }
}

#[derive(Debug)]
pub struct DownloadManager {
    db: JobDb,
    board: Arc<JobBoard>,
    registry: Arc<ProcessRegistry>,
    supervisor: Supervisor,
    settings: ManagerSettings,
    _owner: OwnerLock,
}

impl DownloadManager {
    fn new(
        db: JobDb,
        owner: OwnerLock,
        launcher: Arc<dyn Launcher>,
        settings: ManagerSettings,
    ) -> Self {
        let board = Arc::new(JobBoard::new());
        let registry = Arc::new(ProcessRegistry::new());
        let supervisor = Supervisor::new(
            db.clone(),
            Arc::clone(&board),
            Arc::clone(&registry),
            launcher,
            settings.kill_grace,
        );
        Self {
            db,
            board,
            registry,
            supervisor,
            settings,
            _owner: owner,
        }
    }

    /// Manager running the configured downloader, with stored jobs loaded.
    ///
    /// Fails with `StoreError::Busy` while another manager owns the store.
    pub async fn open(cfg: &DsupConfig, db: JobDb) -> StoreResult<Self> {
        let launcher = Arc::new(YtDlpLauncher::from_config(cfg));
        Self::open_with(db, launcher, ManagerSettings::from_config(cfg)).await
    }

    /// Like [`DownloadManager::open`] with an explicit launcher.
    pub async fn open_with(
        db: JobDb,
        launcher: Arc<dyn Launcher>,
        settings: ManagerSettings,
    ) -> StoreResult<Self> {
        // Before recover: rows another owner is running must not look interrupted.
        let owner = OwnerLock::acquire(&db)?;
        let mgr = Self::new(db, owner, launcher, settings);
        mgr.recover().await;
        mgr.refresh().await;
        Ok(mgr)
    }

    /// Turn jobs left Active by a previous session into resumable Paused jobs.
    pub async fn recover(&self) {
        match self.db.recover_interrupted().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "marked interrupted downloads as paused"),
            Err(e) => tracing::error!("recover interrupted downloads: {}", e),
        }
    }

    /// Reload the board from the store. On failure the board keeps its
    /// contents and the error slot is set.
    ///
    /// Jobs with a live process keep their in-memory entry whether or not
    /// they are among the loaded rows.
    pub async fn refresh(&self) {
        match self.db.list(self.settings.list_limit).await {
            Ok(jobs) => {
                tracing::debug!(count = jobs.len(), "loaded download history");
                self.board.replace_all(jobs, |id| self.registry.contains(id));
            }
            Err(e) => {
                tracing::error!("load download history: {}", e);
                self.board.set_error(LOAD_FAILED);
            }
        }
    }

    /// Create a job for `url` and start downloading it. Returns the new
    /// job's `unique_id`, or None for a blank url or a store failure.
    pub async fn start(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if url.is_empty() {
            tracing::debug!("ignoring start with empty url");
            return None;
        }

        let job = self.insert_new(url).await?;
        self.launch_new(job).await
    }

    /// Put a freshly stored job on the board and spawn its first attempt.
    async fn launch_new(&self, job: JobRecord) -> Option<String> {
        let job_id = job.unique_id.clone();
        let url = job.url.clone();
        if !self.board.insert(job) {
            tracing::error!(job = %job_id, "new job id already on the board; not starting");
            self.board.set_error(START_FAILED);
            return None;
        }
        let lock = self.board.job_lock(&job_id)?;
        let _guard = lock.lock().await;
        tracing::info!(job = %job_id, %url, "download queued");
        self.supervisor.spawn_attempt(&job_id, &url).await;
        Some(job_id)
    }

    async fn insert_new(&self, url: &str) -> Option<JobRecord> {
        for _ in 0..INSERT_ATTEMPTS {
            let job = JobRecord::new(url);
            match self.db.insert(&job).await {
                Ok(()) => return Some(job),
                Err(StoreError::DuplicateKey(id)) => {
                    tracing::warn!(job = %id, "id collision; drawing new ids");
                }
                Err(e) => {
                    tracing::error!(%url, "store new download: {}", e);
                    self.board.set_error(START_FAILED);
                    return None;
                }
            }
        }
        tracing::error!(%url, "no free job id after {} attempts", INSERT_ATTEMPTS);
        self.board.set_error(START_FAILED);
        None
    }

    /// Pause a running job: mark it Paused, then stop its process.
    ///
    /// No-op when no process is registered for the job.
    pub async fn pause(&self, job_id: &str) {
        if !self.registry.contains(job_id) {
            tracing::debug!(job = %job_id, "pause: not running");
            return;
        }
        let Some(lock) = self.board.job_lock(job_id) else {
            return;
        };
        let _guard = lock.lock().await;
        // The process may have ended while we waited for the lock.
        if !self.registry.contains(job_id) {
            tracing::debug!(job = %job_id, "pause: process ended first");
            return;
        }

        if let Some(patch) = self.board.mark_paused(job_id) {
            self.supervisor.persist(job_id, &patch).await;
        }
        match self.registry.kill_and_remove(job_id).await {
            Ok(_) => tracing::info!(job = %job_id, "download paused"),
            Err(e) => tracing::warn!(job = %job_id, "{}", e),
        }
    }

    /// Run a fresh process for a Paused or Failed job.
    ///
    /// No-op when a process is registered, the job is unknown, or it is in
    /// any other state.
    pub async fn resume(&self, job_id: &str) {
        if self.registry.contains(job_id) {
            tracing::debug!(job = %job_id, "resume: already running");
            return;
        }
        let Some(lock) = self.board.job_lock(job_id) else {
            tracing::debug!(job = %job_id, "resume: unknown job");
            return;
        };
        let _guard = lock.lock().await;
        let Some(job) = self.board.get(job_id) else {
            return;
        };
        let status = job.status();
        if !status.is_resumable() {
            tracing::debug!(job = %job_id, status = status.as_str(), "resume: nothing to resume");
            return;
        }
        tracing::info!(job = %job_id, from = status.as_str(), "resuming download");
        self.supervisor.spawn_attempt(job_id, &job.url).await;
    }

    /// Delete every job from the store and the board and stop every running
    /// process. If the store cannot be cleared nothing else changes.
    pub async fn clear_all(&self) {
        match self.db.clear_all().await {
            Ok(n) => tracing::info!(rows = n, "download history cleared"),
            Err(e) => {
                tracing::error!("clear download history: {}", e);
                self.board.set_error(CLEAR_FAILED);
                return;
            }
        }
        // Board first, so exiting processes find no job to update.
        self.board.clear();
        let stopped = self.registry.kill_all().await;
        if stopped > 0 {
            tracing::info!(count = stopped, "stopped running downloads");
        }
    }

    /// Newest-first view of the board, capped at `limit`.
    pub fn list(&self, limit: usize) -> Vec<JobRecord> {
        self.board.list(limit)
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.board.get(job_id)
    }

    /// Receiver that sees a new snapshot after every board change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.board.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.board.last_error()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.registry.contains(job_id)
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Pause every running job, e.g. before the process exits. Paused jobs
    /// are resumed by a later session.
    pub async fn shutdown(&self) {
        let ids = self.registry.ids();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "pausing running downloads for shutdown");
        }
        for id in ids {
            self.pause(&id).await;
        }
    }
}
