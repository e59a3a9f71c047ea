//! Logging for dsup: a `dsup.log` next to the job store, or stderr.
//!
//! The filter comes from `DSUP_LOG` (EnvFilter syntax). Downloader stderr is
//! logged under [`DOWNLOADER_TARGET`], so `DSUP_LOG=info,dsup::downloader=debug`
//! shows what yt-dlp printed without the rest of the debug noise.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "DSUP_LOG";

/// Target of events carrying downloader stderr lines.
pub const DOWNLOADER_TARGET: &str = "dsup::downloader";

const DEFAULT_FILTER: &str = "info,dsup_core=debug,dsup::downloader=debug";

/// Filter from `spec`, or the default one when it is unset or does not parse.
fn filter_from(spec: Option<&str>) -> EnvFilter {
    spec.and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn env_filter() -> EnvFilter {
    filter_from(std::env::var(LOG_ENV).ok().as_deref())
}

/// `dsup.log` in the state directory, beside `dsup.db`.
pub fn log_path() -> Result<PathBuf> {
    Ok(config::state_dir()?.join("dsup.log"))
}

/// Append structured logs to [`log_path`]. Returns the file in use.
///
/// Errors (unwritable state dir, subscriber already set) are returned so the
/// caller can fall back to [`init_logging_stderr`].
pub fn init_logging() -> Result<PathBuf> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install subscriber: {e}"))?;

    tracing::info!(pid = std::process::id(), "dsup logging to {}", path.display());
    Ok(path)
}

/// Log to stderr instead. Used when `init_logging` fails.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_falls_back_to_default() {
        assert_eq!(filter_from(None).to_string(), EnvFilter::new(DEFAULT_FILTER).to_string());
        assert_eq!(
            filter_from(Some("dsup_core=[")).to_string(),
            EnvFilter::new(DEFAULT_FILTER).to_string()
        );
    }

    #[test]
    fn filter_uses_given_spec() {
        assert_eq!(filter_from(Some("warn")).to_string(), "warn");
    }

    #[test]
    fn default_filter_enables_downloader_output() {
        assert!(DEFAULT_FILTER.contains(&format!("{DOWNLOADER_TARGET}=debug")));
    }
}
