//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::Path;

use serde_json::Value;

use crate::config::{Config, ConfigLoader};
use crate::pipeline::JobManager;
use crate::storage::{SharedJobStore, open_job_store};
use crate::types::{DocumentShape, PipelineError, Result};

/// Command execution context
///
/// Holds the merged configuration. Commands open only the resources they
/// need: `manager()` for generation, `store()` for read-only lookups.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
}

impl CommandContext {
    /// Load and validate the layered configuration
    pub fn load() -> Result<Self> {
        Ok(Self {
            config: ConfigLoader::load()?,
        })
    }

    /// Build a job manager with providers, ledger and store
    pub fn manager(&self) -> Result<JobManager> {
        JobManager::from_config(&self.config)
    }

    /// Open the job store without building any provider
    pub fn store(&self) -> Result<SharedJobStore> {
        open_job_store(&self.config.storage)
    }
}

/// Read a JSON file into a value
pub fn read_json_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        PipelineError::InvalidRequest(format!("{} is not valid JSON: {}", path.display(), e))
    })
}

/// Read a document shape template from a JSON file
pub fn read_shape_file(path: &Path) -> Result<DocumentShape> {
    DocumentShape::from_value(read_json_file(path)?)
}
