//! Building the downloader command line.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::DsupConfig;

/// Program and arguments for one downloader run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    /// Command ready to spawn: no stdin, piped stdout/stderr.
    ///
    /// On unix the child leads its own process group so a pause can signal
    /// helpers it starts (muxers, fragment fetchers) along with it.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }
        cmd
    }
}

/// Produces the invocation for a URL. The supervisor only relies on the
/// contract: progress on stdout, one line per update, exit code 0 on success.
pub trait Launcher: Send + Sync {
    fn invocation(&self, url: &str) -> Invocation;
}

/// yt-dlp style downloader.
///
/// Every run for the same URL writes to the same `%(title)s.%(ext)s` path, so a
/// fresh run after a pause picks up the partial file. Changing the template
/// breaks resume for jobs already in flight.
#[derive(Debug, Clone)]
pub struct YtDlpLauncher {
    program: PathBuf,
    format_selector: String,
    extractor_args: String,
    output_template: String,
}

impl YtDlpLauncher {
    pub fn from_config(cfg: &DsupConfig) -> Self {
        let output_template = cfg
            .output_dir()
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();
        Self {
            program: PathBuf::from(&cfg.downloader_program),
            format_selector: cfg.format_selector.clone(),
            extractor_args: cfg.extractor_args.clone(),
            output_template,
        }
    }
}

impl Launcher for YtDlpLauncher {
    fn invocation(&self, url: &str) -> Invocation {
        let mut args = vec!["-f".to_string(), self.format_selector.clone()];
        if !self.extractor_args.is_empty() {
            args.push("--extractor-args".to_string());
            args.push(self.extractor_args.clone());
        }
        // A stale extractor cache makes repeated runs fail in odd ways.
        args.push("--rm-cache-dir".to_string());
        args.push("-o".to_string());
        args.push(self.output_template.clone());
        args.push(url.to_string());
        args.push("--newline".to_string());
        Invocation {
            program: self.program.clone(),
            args,
        }
    }
}
