//! Job Command
//!
//! Show one job record by id.

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::types::{JobId, PipelineError, Result};

pub async fn run(id: &str, format: &str) -> Result<()> {
    let id: JobId = id.parse()?;
    let store = CommandContext::load()?.store()?;

    let job = store
        .get(&id)
        .await?
        .ok_or_else(|| PipelineError::JobNotFound(id.to_string()))?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        Output::new().job(&job);
    }
    Ok(())
}
