//! `dsup resume <id>` – resume a paused or failed job.

use anyhow::{bail, Result};
use dsup_core::config::DsupConfig;

use super::follow::{follow_job, report};
use super::{forward, open_manager, Serving};
use crate::cli::control_socket::ControlRequest;

pub async fn run_resume(cfg: &DsupConfig, id: &str) -> Result<()> {
    if forward(&ControlRequest::Resume(id.to_string())).await?.is_some() {
        println!("Resume requested for {id}");
        return Ok(());
    }

    let mgr = open_manager(cfg).await?;
    let Some(job) = mgr.get(id) else {
        bail!("no job {id}");
    };
    if !job.status().is_resumable() {
        println!("{id} is {}; nothing to resume", job.status().as_str());
        return Ok(());
    }

    let serving = Serving::try_start(&mgr);
    mgr.resume(id).await;
    let outcome = follow_job(&mgr, id)
        .await
        .and_then(|status| report(id, status));
    mgr.shutdown().await;
    if let Some(s) = serving {
        s.stop();
    }
    outcome
}
