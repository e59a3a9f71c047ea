//! CLI command handlers. Each command is in its own file.

mod clear;
mod follow;
mod pause;
mod resume;
mod run;
mod start;
mod status;

pub use clear::run_clear;
pub use pause::run_pause;
pub use resume::run_resume;
pub use run::run_supervisor;
pub use start::run_start;
pub use status::run_status;

use anyhow::{bail, Context, Result};
use dsup_core::config::{self, DsupConfig};
use dsup_core::job_db::StoreError;
use dsup_core::DownloadManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::cli::control_socket::{self, ControlRequest};
use crate::cli::open_db;

/// Hand `req` to the dsup process that owns the store. Returns None when none
/// is listening, otherwise the reply payload (or the owner's error).
async fn forward(req: &ControlRequest) -> Result<Option<Option<String>>> {
    let path = config::control_socket_path()?;
    match control_socket::send_request(&path, req).await? {
        Some(reply) => Ok(Some(control_socket::parse_reply(&reply)?)),
        None => {
            tracing::debug!(path = %path.display(), "no supervisor listening");
            Ok(None)
        }
    }
}

/// Open the store as its single owner.
async fn open_manager(cfg: &DsupConfig) -> Result<Arc<DownloadManager>> {
    match DownloadManager::open(cfg, open_db().await?).await {
        Ok(mgr) => Ok(Arc::new(mgr)),
        Err(StoreError::Busy(path)) => bail!(
            "{} is owned by another dsup process that is not accepting commands yet; try again",
            path.display()
        ),
        Err(e) => Err(e).context("open download manager"),
    }
}

/// Control socket served by whichever process owns the store.
struct Serving {
    listener: JoinHandle<()>,
    path: PathBuf,
}

impl Serving {
    fn start(mgr: &Arc<DownloadManager>) -> Result<Self> {
        let path = config::control_socket_path()?;
        let listener = control_socket::spawn_control_listener(Arc::clone(mgr), &path)?;
        tracing::info!(path = %path.display(), "control socket listening");
        Ok(Self { listener, path })
    }

    /// Like `start`, but a foreground download carries on without a socket.
    fn try_start(mgr: &Arc<DownloadManager>) -> Option<Self> {
        match Self::start(mgr) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        }
    }

    fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Stop accepting requests and remove the socket file.
    fn stop(self) {
        self.listener.abort();
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!("remove control socket: {}", e);
        }
    }
}
