//! CLI for the dsup download supervisor.

mod commands;
mod control_socket;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dsup_core::config;
use dsup_core::job_db::JobDb;

use commands::{run_clear, run_pause, run_resume, run_start, run_status, run_supervisor};

/// Top-level CLI for the dsup download supervisor.
#[derive(Debug, Parser)]
#[command(name = "dsup")]
#[command(about = "dsup: run and track yt-dlp style downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the supervisor in the foreground and serve the control socket.
    Run,

    /// Start downloading a URL. Handed to `dsup run` when one is listening,
    /// otherwise downloaded in the foreground.
    Start {
        /// Page or media URL understood by the downloader.
        url: String,
    },

    /// Pause a running job (kills its downloader process).
    Pause {
        /// Job identifier (`unique_id` shown by `dsup status`).
        id: String,
    },

    /// Resume a paused or failed job with a fresh downloader process.
    Resume {
        /// Job identifier.
        id: String,
    },

    /// Delete every job and stop every running download.
    Clear,

    /// Show stored jobs, newest first.
    Status {
        /// Maximum number of jobs to show (default: `list_limit` from config).
        #[arg(long, value_name = "N")]
        limit: Option<u32>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init().context("load config")?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run => run_supervisor(&cfg).await?,
            CliCommand::Start { url } => run_start(&cfg, &url).await?,
            CliCommand::Pause { id } => run_pause(&id).await?,
            CliCommand::Resume { id } => run_resume(&cfg, &id).await?,
            CliCommand::Clear => run_clear(&cfg).await?,
            CliCommand::Status { limit, json } => {
                let db = open_db().await?;
                run_status(&db, limit.unwrap_or(cfg.list_limit), json).await?;
            }
        }

        Ok(())
    }
}

pub(crate) async fn open_db() -> Result<JobDb> {
    JobDb::open_default().await.context("open job store")
}

#[cfg(test)]
mod tests;
