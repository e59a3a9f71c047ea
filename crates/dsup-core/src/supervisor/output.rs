//! Draining the downloader's stdout and stderr.
//!
//! Lines are split on `\n` and decoded lossily: a stray non-UTF-8 byte must
//! not stop the reader, or the pipe fills up and the child blocks.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::board::JobBoard;
use crate::logging::DOWNLOADER_TARGET;

/// Printed by the downloader while clearing its cache on every run.
const CACHE_NOISE: &str = "Removing cache";

/// The tracking message for a raw stdout line, if it carries one.
pub(crate) fn progress_line(raw: &str) -> Option<&str> {
    let line = raw.trim();
    if line.is_empty() || line.contains(CACHE_NOISE) {
        return None;
    }
    Some(line)
}

/// Feed stdout lines of `attempt` into the board until the stream closes.
pub(super) async fn drain_stdout<R>(board: Arc<JobBoard>, job_id: String, attempt: u64, out: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(out).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(bytes)) => {
                let raw = String::from_utf8_lossy(&bytes);
                if let Some(msg) = progress_line(&raw) {
                    board.record_progress(&job_id, attempt, msg);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(job = %job_id, "stdout read: {}", e);
                break;
            }
        }
    }
}

/// Route stderr to the log only (under `DOWNLOADER_TARGET`); it never
/// decides the outcome of a job.
pub(super) async fn drain_stderr<R>(job_id: String, err: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(err).split(b'\n');
    while let Ok(Some(bytes)) = lines.next_segment().await {
        let raw = String::from_utf8_lossy(&bytes);
        let line = raw.trim_end();
        if !line.is_empty() {
            tracing::debug!(target: DOWNLOADER_TARGET, job = %job_id, "{}", line);
        }
    }
}
