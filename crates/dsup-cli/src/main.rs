use dsup_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    match logging::init_logging() {
        Ok(path) => tracing::debug!(log = %path.display(), "file logging ready"),
        Err(err) => {
            logging::init_logging_stderr();
            tracing::warn!("file logging unavailable, using stderr: {:#}", err);
        }
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("dsup error: {:#}", err);
        std::process::exit(1);
    }
}
