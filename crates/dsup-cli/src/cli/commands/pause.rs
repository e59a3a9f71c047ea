//! `dsup pause <id>` – pause a job running under `dsup run`.

use anyhow::Result;

use super::forward;
use crate::cli::control_socket::ControlRequest;

pub async fn run_pause(id: &str) -> Result<()> {
    match forward(&ControlRequest::Pause(id.to_string())).await? {
        Some(_) => println!("Pause requested for {id}"),
        // Without a supervisor nothing is running; leftovers are marked
        // paused the next time the store is opened.
        None => println!("No running supervisor; nothing to pause"),
    }
    Ok(())
}
