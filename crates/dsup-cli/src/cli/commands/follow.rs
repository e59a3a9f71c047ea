//! Foreground mode: follow one job until it leaves the Active state.

use anyhow::{bail, Result};
use dsup_core::job_db::JobStatus;
use dsup_core::DownloadManager;

/// Print the job's tracking messages until it completes, fails or is paused.
/// Ctrl-C pauses the job so a later `dsup resume` can pick it up.
pub(super) async fn follow_job(mgr: &DownloadManager, id: &str) -> Result<JobStatus> {
    let mut rx = mgr.subscribe();
    let mut last_message = String::new();
    loop {
        let job = rx
            .borrow_and_update()
            .iter()
            .find(|j| j.unique_id == id)
            .cloned();
        let Some(job) = job else {
            bail!("job {id} is gone");
        };
        if job.tracking_message != last_message {
            println!("{}", job.tracking_message);
            last_message = job.tracking_message.clone();
        }
        let status = job.status();
        if matches!(
            status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Paused
        ) {
            return Ok(status);
        }

        tokio::select! {
            changed = rx.changed() => changed?,
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted; pausing {id}");
                mgr.pause(id).await;
                return Ok(JobStatus::Paused);
            }
        }
    }
}

pub(super) fn report(id: &str, status: JobStatus) -> Result<()> {
    match status {
        JobStatus::Completed => println!("Finished {id}"),
        JobStatus::Paused => println!("Paused {id}; continue with `dsup resume {id}`"),
        JobStatus::Failed => bail!("download {id} failed"),
        other => println!("{id} is {}", other.as_str()),
    }
    Ok(())
}
