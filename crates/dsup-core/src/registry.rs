//! Process registry: which jobs currently own a live downloader process.
//!
//! Each spawned process is registered under its job's `unique_id` with a
//! handle that can ask the task owning the child to terminate it. The handle
//! carries the attempt number of the spawn, so an old process that exits late
//! never removes the entry of its successor.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{mpsc, oneshot};

/// Reply channel for a kill request: the owner answers once the process is gone.
pub type KillAck = oneshot::Sender<io::Result<()>>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A process is already registered for this job (a start/resume raced).
    #[error("job {0} already has a live process")]
    AlreadyRegistered(String),
    /// Sending the termination signal or reaping the process failed.
    #[error("failed to stop process for job {id}: {source}")]
    KillFailed {
        id: String,
        #[source]
        source: io::Error,
    },
}

/// Killable reference to a running downloader process.
///
/// The child itself is owned by the supervisor task waiting on it; the handle
/// only forwards kill requests to that task.
#[derive(Debug)]
pub struct ProcessHandle {
    attempt: u64,
    pid: Option<u32>,
    kill_tx: mpsc::Sender<KillAck>,
}

/// Receiving side of a [`ProcessHandle`], held by the task that owns the child.
#[derive(Debug)]
pub struct KillRequests {
    rx: mpsc::Receiver<KillAck>,
}

impl KillRequests {
    /// Next kill request, or None once every handle is gone.
    pub async fn recv(&mut self) -> Option<KillAck> {
        self.rx.recv().await
    }
}

impl ProcessHandle {
    pub fn new(attempt: u64, pid: Option<u32>) -> (Self, KillRequests) {
        let (kill_tx, rx) = mpsc::channel(1);
        (
            Self {
                attempt,
                pid,
                kill_tx,
            },
            KillRequests { rx },
        )
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the owner to terminate the process and wait until it has exited.
    ///
    /// If the owner is already gone the process has exited on its own, which
    /// counts as success.
    pub async fn kill(&self) -> io::Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.kill_tx.send(ack_tx).await.is_err() {
            return Ok(());
        }
        ack_rx.await.unwrap_or(Ok(()))
    }
}

/// Shared map of job id -> live process handle.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    procs: RwLock<HashMap<String, Arc<ProcessHandle>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<ProcessHandle>>> {
        self.procs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<ProcessHandle>>> {
        self.procs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly spawned process. An occupied slot is left untouched
    /// and reported as `AlreadyRegistered`.
    pub fn register(
        &self,
        job_id: &str,
        handle: ProcessHandle,
    ) -> Result<Arc<ProcessHandle>, RegistryError> {
        let mut procs = self.write();
        if procs.contains_key(job_id) {
            return Err(RegistryError::AlreadyRegistered(job_id.to_string()));
        }
        let handle = Arc::new(handle);
        procs.insert(job_id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    pub fn lookup(&self, job_id: &str) -> Option<Arc<ProcessHandle>> {
        self.read().get(job_id).cloned()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.read().contains_key(job_id)
    }

    pub fn remove(&self, job_id: &str) -> Option<Arc<ProcessHandle>> {
        self.write().remove(job_id)
    }

    /// Remove the entry for `job_id` only if it belongs to `attempt`.
    pub fn remove_attempt(&self, job_id: &str, attempt: u64) -> bool {
        let mut procs = self.write();
        match procs.get(job_id) {
            Some(h) if h.attempt == attempt => {
                procs.remove(job_id);
                true
            }
            _ => false,
        }
    }

    /// Terminate the process registered for `job_id`, wait for it to exit,
    /// then drop the entry. Returns Ok(false) when nothing was registered.
    ///
    /// On failure the entry stays, since the process may still be running.
    pub async fn kill_and_remove(&self, job_id: &str) -> Result<bool, RegistryError> {
        let Some(handle) = self.lookup(job_id) else {
            return Ok(false);
        };
        handle
            .kill()
            .await
            .map_err(|source| RegistryError::KillFailed {
                id: job_id.to_string(),
                source,
            })?;
        self.remove_attempt(job_id, handle.attempt);
        Ok(true)
    }

    /// Kill every registered process. Failures are logged; returns how many
    /// processes were stopped.
    pub async fn kill_all(&self) -> usize {
        let mut stopped = 0;
        for id in self.ids() {
            match self.kill_and_remove(&id).await {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("{}", e),
            }
        }
        stopped
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stand-in for the supervisor task: answers kill requests with `reply`.
    fn spawn_owner(
        mut requests: KillRequests,
        reply: fn() -> io::Result<()>,
        kills: Arc<AtomicUsize>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Some(ack) = requests.recv().await {
                kills.fetch_add(1, Ordering::SeqCst);
                let _ = ack.send(reply());
            }
        })
    }

    #[test]
    fn register_rejects_second_handle() {
        let reg = ProcessRegistry::new();
        let (h1, _r1) = ProcessHandle::new(1, Some(10));
        let (h2, _r2) = ProcessHandle::new(2, Some(11));
        reg.register("job", h1).unwrap();
        let err = reg.register("job", h2).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(ref id) if id == "job"));
        assert_eq!(reg.lookup("job").unwrap().attempt(), 1);
        assert_eq!(reg.lookup("job").unwrap().pid(), Some(10));
    }

    #[test]
    fn remove_attempt_ignores_other_attempts() {
        let reg = ProcessRegistry::new();
        let (h, _r) = ProcessHandle::new(3, None);
        reg.register("job", h).unwrap();
        assert!(!reg.remove_attempt("job", 2));
        assert!(reg.contains("job"));
        assert!(reg.remove_attempt("job", 3));
        assert!(reg.is_empty());
        assert!(!reg.remove_attempt("job", 3));
    }

    #[tokio::test]
    async fn kill_and_remove_absent_is_noop() {
        let reg = ProcessRegistry::new();
        assert!(!reg.kill_and_remove("missing").await.unwrap());
    }

    #[tokio::test]
    async fn kill_and_remove_waits_for_owner() {
        let reg = ProcessRegistry::new();
        let kills = Arc::new(AtomicUsize::new(0));
        let (h, requests) = ProcessHandle::new(1, Some(42));
        reg.register("job", h).unwrap();
        let owner = spawn_owner(requests, || Ok(()), Arc::clone(&kills));

        assert!(reg.kill_and_remove("job").await.unwrap());
        assert!(!reg.contains("job"));
        assert_eq!(kills.load(Ordering::SeqCst), 1);
        owner.await.unwrap();

        // Second call finds nothing.
        assert!(!reg.kill_and_remove("job").await.unwrap());
    }

    #[tokio::test]
    async fn kill_failure_keeps_entry() {
        let reg = ProcessRegistry::new();
        let kills = Arc::new(AtomicUsize::new(0));
        let (h, requests) = ProcessHandle::new(1, None);
        reg.register("job", h).unwrap();
        let _owner = spawn_owner(
            requests,
            || Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope")),
            Arc::clone(&kills),
        );

        let err = reg.kill_and_remove("job").await.unwrap_err();
        assert!(matches!(err, RegistryError::KillFailed { ref id, .. } if id == "job"));
        assert!(reg.contains("job"));
    }

    #[tokio::test]
    async fn kill_after_owner_exit_succeeds() {
        let (h, requests) = ProcessHandle::new(1, None);
        drop(requests);
        h.kill().await.unwrap();
    }

    #[tokio::test]
    async fn kill_all_stops_everything() {
        let reg = ProcessRegistry::new();
        let kills = Arc::new(AtomicUsize::new(0));
        let mut owners = Vec::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let (h, requests) = ProcessHandle::new(i as u64, None);
            reg.register(id, h).unwrap();
            owners.push(spawn_owner(requests, || Ok(()), Arc::clone(&kills)));
        }
        assert_eq!(reg.kill_all().await, 3);
        assert!(reg.is_empty());
        assert_eq!(kills.load(Ordering::SeqCst), 3);
    }
}
