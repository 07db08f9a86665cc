//! Jobs Command
//!
//! List an owner's jobs, newest first.

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::types::Result;

pub async fn run(owner: &str, limit: usize, format: &str) -> Result<()> {
    let store = CommandContext::load()?.store()?;
    let jobs = store.list_by_owner(owner, limit).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    let output = Output::new();
    output.header(&format!("Jobs for {}", owner));
    if jobs.is_empty() {
        output.info("No jobs found");
        return Ok(());
    }
    for job in &jobs {
        output.job_row(job);
    }
    Ok(())
}
