//! Generate Command
//!
//! Submit one generation job and wait for it to finish.
//!
//! Usage:
//!   genpipe generate --prompt "..." [--input params.json] [--shape shape.json]
//!                    [--model NAME] [--stream] [--owner NAME] [-f json]

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::CommandContext;
use crate::cli::ui::Output;
use crate::cli::util::{read_json_file, read_shape_file};
use crate::constants::jobs::DEFAULT_POLL_INTERVAL_MS;
use crate::types::{GenerationRequest, JobStatus, PipelineError, Result};

/// Options of a single `generate` invocation
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub prompt: String,
    pub input: Option<PathBuf>,
    pub shape: Option<PathBuf>,
    pub model: Option<String>,
    pub stream: bool,
    pub owner: String,
    pub format: String,
}

impl GenerateOptions {
    /// Assemble the request from files and flags
    pub fn to_request(&self) -> Result<GenerationRequest> {
        let mut request = GenerationRequest::new(&self.prompt).streaming(self.stream);

        if let Some(path) = &self.input {
            request = request.with_parameters(read_json_file(path)?);
        }
        if let Some(path) = &self.shape {
            request = request.with_shape(read_shape_file(path)?);
        }
        if let Some(model) = &self.model {
            request = request.with_model(model);
        }

        Ok(request)
    }
}

pub async fn run(options: GenerateOptions) -> Result<()> {
    let output = Output::new();
    let request = options.to_request()?;

    let ctx = CommandContext::load()?;
    let manager = ctx.manager()?;

    let handle = manager.submit(&options.owner, request).await?;
    if options.format != "json" {
        output.info(&format!("Submitted job {} ({})", handle.id, handle.status.as_str()));
    }

    let job = manager
        .wait_for_terminal(&handle.id, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
        .await?;
    manager.drain().await;

    if options.format == "json" {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        output.job(&job);
        output.section("Metrics");
        println!("{}", manager.metrics().summary().display());
    }

    if job.status == JobStatus::Failed {
        return Err(PipelineError::LlmApi(
            job.status_message
                .unwrap_or_else(|| "Generation failed".to_string()),
        ));
    }

    output.success("Generation completed");
    Ok(())
}
