//! Shared fixtures: a scratch store and a fake downloader written in `sh`.
//!
//! The fake downloader logs each run to `spawns.log`, prints a progress line,
//! then waits for a gate file whose content is its exit code.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dsup_core::board::Snapshot;
use dsup_core::job_db::{JobDb, JobRecord};
use dsup_core::supervisor::{Invocation, Launcher};
use dsup_core::{DownloadManager, ManagerSettings};
use tempfile::TempDir;

pub const PROGRESS: &str = "50% of 10MiB";
const WAIT: Duration = Duration::from_secs(10);

/// Runs `/bin/sh -c <script> fake-downloader <url>`.
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    program: PathBuf,
    script: String,
}

impl ScriptLauncher {
    pub fn missing_program() -> Self {
        Self {
            program: PathBuf::from("/nonexistent/dsup-test-downloader"),
            script: String::new(),
        }
    }
}

impl Launcher for ScriptLauncher {
    fn invocation(&self, url: &str) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args: vec![
                "-c".to_string(),
                self.script.clone(),
                "fake-downloader".to_string(),
                url.to_string(),
            ],
        }
    }
}

pub struct Fixture {
    _dir: TempDir,
    pub db: JobDb,
    pub db_path: PathBuf,
    log: PathBuf,
    gate: PathBuf,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state/dsup.db");
        let db = JobDb::open_at(&db_path).await.unwrap();
        let log = dir.path().join("spawns.log");
        let gate = dir.path().join("gate");
        Self {
            _dir: dir,
            db,
            db_path,
            log,
            gate,
        }
    }

    /// Fake downloader that exits with `on_term` when signalled.
    pub fn launcher(&self, on_term: i32) -> Arc<ScriptLauncher> {
        let script = format!(
            "trap 'exit {on_term}' TERM\n\
             echo \"$1\" >> '{log}'\n\
             echo 'Removing cache dir /tmp/fake'\n\
             echo '{PROGRESS}'\n\
             while [ ! -e '{gate}' ]; do sleep 0.02; done\n\
             exit \"$(cat '{gate}')\"\n",
            log = self.log.display(),
            gate = self.gate.display(),
        );
        Arc::new(ScriptLauncher {
            program: PathBuf::from("/bin/sh"),
            script,
        })
    }

    pub fn settings() -> ManagerSettings {
        ManagerSettings {
            list_limit: 50,
            kill_grace: Duration::from_secs(2),
        }
    }

    pub async fn manager(&self, launcher: Arc<dyn Launcher>) -> DownloadManager {
        DownloadManager::open_with(self.db.clone(), launcher, Self::settings())
            .await
            .unwrap()
    }

    /// Let every waiting (and future) fake run exit with `code`.
    pub fn release(&self, code: i32) {
        write_atomic(&self.gate, &code.to_string());
    }

    pub fn spawn_count(&self) -> usize {
        std::fs::read_to_string(&self.log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

fn write_atomic(path: &Path, contents: &str) {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents).unwrap();
    std::fs::rename(&tmp, path).unwrap();
}

/// Wait until a published snapshot satisfies `pred`.
pub async fn wait_for<F>(mgr: &DownloadManager, mut pred: F) -> Snapshot
where
    F: FnMut(&[JobRecord]) -> bool,
{
    let mut rx = mgr.subscribe();
    tokio::time::timeout(WAIT, async {
        loop {
            let snap = rx.borrow_and_update().clone();
            if pred(&snap) {
                return snap;
            }
            rx.changed().await.expect("board dropped");
        }
    })
    .await
    .expect("timed out waiting for board state")
}

/// Wait until job `id` satisfies `pred`; returns that record.
pub async fn wait_job<F>(mgr: &DownloadManager, id: &str, mut pred: F) -> JobRecord
where
    F: FnMut(&JobRecord) -> bool,
{
    let snap = wait_for(mgr, |jobs| {
        jobs.iter().any(|j| j.unique_id == id && pred(j))
    })
    .await;
    snap.iter()
        .find(|j| j.unique_id == id)
        .cloned()
        .unwrap()
}

/// Poll `cond` until it holds.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition")
}
