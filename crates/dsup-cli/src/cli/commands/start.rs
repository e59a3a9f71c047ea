//! `dsup start <url>` – start a download.

use anyhow::{bail, Result};
use dsup_core::config::DsupConfig;

use super::follow::{follow_job, report};
use super::{forward, open_manager, Serving};
use crate::cli::control_socket::ControlRequest;

pub async fn run_start(cfg: &DsupConfig, url: &str) -> Result<()> {
    if url.trim().is_empty() {
        bail!("url is empty");
    }
    if let Some(reply) = forward(&ControlRequest::Start(url.trim().to_string())).await? {
        match reply {
            Some(id) => println!("Started {id}"),
            None => println!("Started"),
        }
        return Ok(());
    }

    // Nobody owns the store: own it and download in the foreground. Commands
    // from other terminals reach us through the socket meanwhile.
    let mgr = open_manager(cfg).await?;
    let serving = Serving::try_start(&mgr);
    let outcome = match mgr.start(url).await {
        Some(id) => {
            println!("Started {id}");
            follow_job(&mgr, &id)
                .await
                .and_then(|status| report(&id, status))
        }
        None => Err(anyhow::anyhow!(
            "{}",
            mgr.last_error()
                .unwrap_or_else(|| "download not started".to_string())
        )),
    };
    // Jobs handed to us over the socket do not outlive this process.
    mgr.shutdown().await;
    if let Some(s) = serving {
        s.stop();
    }
    outcome
}
