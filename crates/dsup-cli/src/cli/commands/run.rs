//! `dsup run` – run the supervisor and serve the control socket until Ctrl-C.

use anyhow::Result;
use dsup_core::board::Snapshot;
use dsup_core::config::DsupConfig;
use dsup_core::job_db::JobStatus;
use std::collections::HashMap;

use super::{open_manager, Serving};

pub async fn run_supervisor(cfg: &DsupConfig) -> Result<()> {
    let mgr = open_manager(cfg).await?;
    if let Some(e) = mgr.last_error() {
        tracing::warn!("{}", e);
    }

    let serving = Serving::start(&mgr)?;
    println!("dsup running; control socket at {}", serving.path().display());

    let mut rx = mgr.subscribe();
    let mut seen = index(&rx.borrow_and_update());
    loop {
        tokio::select! {
            changed = rx.changed() => {
                changed?;
                let snap = rx.borrow_and_update().clone();
                print_changes(&seen, &snap);
                seen = index(&snap);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("Shutting down; pausing running downloads");
    serving.stop();
    mgr.shutdown().await;
    Ok(())
}

fn index(snap: &Snapshot) -> HashMap<String, (JobStatus, String)> {
    snap.iter()
        .map(|j| (j.unique_id.clone(), (j.status(), j.tracking_message.clone())))
        .collect()
}

fn print_changes(seen: &HashMap<String, (JobStatus, String)>, snap: &Snapshot) {
    for j in snap.iter() {
        let now = (j.status(), j.tracking_message.clone());
        if seen.get(&j.unique_id) == Some(&now) {
            continue;
        }
        if j.status() != JobStatus::Active || !seen.contains_key(&j.unique_id) {
            tracing::info!(job = %j.unique_id, status = j.status().as_str(), "{}", j.tracking_message);
        }
        println!(
            "{} {:<9} {}",
            j.unique_id,
            j.status().as_str(),
            j.tracking_message
        );
    }
    for id in seen.keys() {
        if !snap.iter().any(|j| &j.unique_id == id) {
            println!("{id} removed");
        }
    }
}
