//! `dsup clear` – delete all jobs.

use anyhow::{bail, Result};
use dsup_core::config::DsupConfig;

use super::{forward, open_manager};
use crate::cli::control_socket::ControlRequest;

pub async fn run_clear(cfg: &DsupConfig) -> Result<()> {
    if forward(&ControlRequest::Clear).await?.is_none() {
        // Owning the store means no other dsup has downloads running in it.
        let mgr = open_manager(cfg).await?;
        mgr.clear_all().await;
        if let Some(e) = mgr.last_error() {
            bail!("{e}");
        }
    }
    println!("Cleared all jobs");
    Ok(())
}
