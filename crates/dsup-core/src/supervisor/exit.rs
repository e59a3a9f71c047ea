//! Waiting on a downloader process and turning its exit into a job state.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::task::JoinHandle;

use super::Supervisor;
use crate::job_db::{JobPatch, JobStatus};
use crate::registry::KillRequests;

/// Upper bound on waiting for buffered stdout after the process is gone.
const STDOUT_FLUSH: Duration = Duration::from_secs(5);

/// Own `child` until it exits, answering kill requests on the way, then
/// reconcile the job's final state.
pub(super) async fn watch_process(
    sup: Supervisor,
    job_id: String,
    attempt: u64,
    mut child: Child,
    mut kills: KillRequests,
    stdout_task: Option<JoinHandle<()>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Some(ack) = kills.recv() => {
            tracing::debug!(job = %job_id, attempt, "kill requested");
            match terminate(&mut child, sup.kill_grace).await {
                Ok(status) => {
                    let _ = ack.send(Ok(()));
                    Ok(status)
                }
                Err(e) => {
                    tracing::warn!(job = %job_id, "terminate downloader: {}", e);
                    let _ = ack.send(Err(e));
                    child.wait().await
                }
            }
        }
    };
    // Requests sent from here on get their ack dropped, which counts as done.
    drop(kills);

    if let Some(task) = stdout_task {
        if tokio::time::timeout(STDOUT_FLUSH, task).await.is_err() {
            tracing::debug!(job = %job_id, "stdout still open after exit; giving up on it");
        }
    }
    sup.registry.remove_attempt(&job_id, attempt);

    // The ack above went out before this lock is taken: pause holds the lock
    // while it waits for the ack.
    let Some(lock) = sup.board.job_lock(&job_id) else {
        tracing::debug!(job = %job_id, "job cleared before exit");
        return;
    };
    let _guard = lock.lock_owned().await;

    let patch = match status {
        Ok(status) if status.success() => {
            tracing::info!(job = %job_id, attempt, "download finished");
            JobPatch::transition(JobStatus::Completed, "Done")
        }
        Ok(status) => {
            tracing::info!(job = %job_id, attempt, %status, "downloader exited unsuccessfully");
            JobPatch::transition(JobStatus::Failed, "Stopped/Failed")
        }
        Err(e) => {
            tracing::error!(job = %job_id, attempt, "wait for downloader: {}", e);
            JobPatch::transition(JobStatus::Failed, format!("Process Error: {e}"))
        }
    };
    sup.finish(&job_id, attempt, patch).await;
}

/// Ask the process (and on unix its whole group) to stop, escalating to a
/// hard kill once `grace` runs out.
pub(super) async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    request_stop(child)?;
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::debug!(pid = ?child.id(), "grace period over; killing");
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return child.start_kill();
    };
    // SAFETY: kill(2) with a negated pid signals the process group the child
    // leads; it touches no memory of ours.
    let rc = unsafe { libc::kill(-pgid, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Instant;

    use tokio::process::Command;

    fn sh(script: &str) -> Child {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd.process_group(0);
        cmd.spawn().unwrap()
    }

    #[tokio::test]
    async fn terminate_uses_term_handler() {
        let mut child = sh("trap 'exit 3' TERM; while :; do sleep 0.05; done");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = terminate(&mut child, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn terminate_escalates_after_grace() {
        let mut child = sh("trap '' TERM; while :; do sleep 0.05; done");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        let status = terminate(&mut child, Duration::from_millis(200)).await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn terminate_after_exit_returns_status() {
        let mut child = sh("exit 0");
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = terminate(&mut child, Duration::from_secs(1)).await.unwrap();
        assert!(status.success());
    }
}
