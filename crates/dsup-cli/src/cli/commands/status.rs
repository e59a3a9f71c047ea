//! `dsup status` – show stored jobs.

use anyhow::Result;
use dsup_core::job_db::JobDb;

pub async fn run_status(db: &JobDb, limit: u32, json: bool) -> Result<()> {
    let jobs = db.list(limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No jobs in database.");
        return Ok(());
    }
    println!("{:<20} {:<10} {:<32} {}", "ID", "STATE", "MESSAGE", "URL");
    for j in jobs {
        println!(
            "{:<20} {:<10} {:<32} {}",
            j.unique_id,
            j.status().as_str(),
            truncate(&j.tracking_message, 32),
            j.url
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
