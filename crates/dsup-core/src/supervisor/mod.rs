//! Process supervisor.
//!
//! Spawns one downloader process per attempt, streams its output into the
//! board, waits for it to end and reconciles the final state:
//! begin attempt → spawn → register → drain stdout/stderr → wait (or kill) →
//! unregister → terminal update unless paused or superseded.
//!
//! Callers hold the job's board lock around `spawn_attempt`, so a start or
//! resume of the same job never spawns twice.

mod exit;
mod launch;
mod output;

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;

use crate::board::JobBoard;
use crate::job_db::{JobDb, JobPatch, JobStatus, StoreError};
use crate::registry::{ProcessHandle, ProcessRegistry};

pub use launch::{Invocation, Launcher, YtDlpLauncher};

/// Shared pieces every supervised process needs. Cheap to clone into tasks.
#[derive(Clone)]
pub struct Supervisor {
    db: JobDb,
    board: Arc<JobBoard>,
    registry: Arc<ProcessRegistry>,
    launcher: Arc<dyn Launcher>,
    kill_grace: Duration,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("running", &self.registry.len())
            .field("kill_grace", &self.kill_grace)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(
        db: JobDb,
        board: Arc<JobBoard>,
        registry: Arc<ProcessRegistry>,
        launcher: Arc<dyn Launcher>,
        kill_grace: Duration,
    ) -> Self {
        Self {
            db,
            board,
            registry,
            launcher,
            kill_grace,
        }
    }

    /// Write a patch to the store. A missing row is expected when the store
    /// was cleared underneath us; anything else is logged as an error.
    pub(crate) async fn persist(&self, job_id: &str, patch: &JobPatch) {
        match self.db.update_fields(job_id, patch).await {
            Ok(()) => {}
            Err(StoreError::RowNotFound(_)) => {
                tracing::warn!(job = %job_id, "no stored row to update; keeping in-memory state");
            }
            Err(e) => tracing::error!(job = %job_id, "persist job update: {}", e),
        }
    }

    /// Run a fresh attempt of `job_id` for `url`. Never fails: a spawn error
    /// becomes the job's Failed state.
    ///
    /// Caller must hold the job's lock.
    pub(crate) async fn spawn_attempt(&self, job_id: &str, url: &str) {
        if self.registry.contains(job_id) {
            tracing::debug!(job = %job_id, "already running; not spawning");
            return;
        }
        let Some((attempt, patch)) = self.board.begin_attempt(job_id) else {
            tracing::debug!(job = %job_id, "job left the board before spawn");
            return;
        };
        self.persist(job_id, &patch).await;

        let invocation = self.launcher.invocation(url);
        let child = match invocation.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    job = %job_id,
                    program = %invocation.program.display(),
                    "spawn downloader: {}",
                    e
                );
                let patch = JobPatch::transition(JobStatus::Failed, format!("Process Error: {e}"));
                self.finish(job_id, attempt, patch).await;
                return;
            }
        };
        tracing::info!(job = %job_id, attempt, pid = ?child.id(), %url, "downloader started");
        self.supervise(job_id, attempt, child).await;
    }

    async fn supervise(&self, job_id: &str, attempt: u64, mut child: Child) {
        let (handle, kills) = ProcessHandle::new(attempt, child.id());
        if let Err(e) = self.registry.register(job_id, handle) {
            tracing::error!(job = %job_id, "{}", e);
            if let Err(e) = exit::terminate(&mut child, self.kill_grace).await {
                tracing::warn!(job = %job_id, "stop duplicate process: {}", e);
            }
            self.finish(
                job_id,
                attempt,
                JobPatch::transition(JobStatus::Failed, format!("Process Error: {e}")),
            )
            .await;
            return;
        }

        let stdout_task = child.stdout.take().map(|out| {
            tokio::spawn(output::drain_stdout(
                Arc::clone(&self.board),
                job_id.to_string(),
                attempt,
                out,
            ))
        });
        if let Some(err) = child.stderr.take() {
            tokio::spawn(output::drain_stderr(job_id.to_string(), err));
        }

        tokio::spawn(exit::watch_process(
            self.clone(),
            job_id.to_string(),
            attempt,
            child,
            kills,
            stdout_task,
        ));
    }

    /// Apply a terminal update for `attempt` and persist it when the
    /// reconciliation rule lets it through. Caller must hold the job's lock.
    pub(crate) async fn finish(&self, job_id: &str, attempt: u64, patch: JobPatch) {
        if let Some(applied) = self.board.finish_attempt(job_id, attempt, patch) {
            self.persist(job_id, &applied).await;
        }
    }
}
