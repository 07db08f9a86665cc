//! Generation job record and its state machine.
//!
//! ```text
//! processing --[document parsed]--> completed
//! processing --[any failure]------> failed
//! ```
//!
//! Both targets are terminal. A job is mutated exactly once after creation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{PipelineError, Result};
use super::shape::DocumentShape;

/// Type-safe wrapper for job IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| PipelineError::InvalidRequest(format!("Invalid job id '{}': {}", s, e)))
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    /// Model override; the configured default model is used when absent
    pub model: Option<String>,
    /// Instruction sent to the model
    pub prompt: String,
    /// Opaque caller fields (title, content types, ...) forwarded to the model
    pub parameters: Value,
    /// Template of the expected document
    pub shape: DocumentShape,
    /// Use the streaming upstream call
    pub stream: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_shape(mut self, shape: DocumentShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Reject requests that cannot produce a job
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }
        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            return Err(PipelineError::InvalidRequest(
                "model override must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Terminal outcome written by a job's background task
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { document: Value },
    Failed { message: String },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Persisted generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub owner: String,
    pub status: JobStatus,
    pub status_message: Option<String>,
    pub input: GenerationRequest,
    pub document: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// New job in `processing` with the default-shaped placeholder document
    pub fn new(owner: impl Into<String>, input: GenerationRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner: owner.into(),
            status: JobStatus::Processing,
            status_message: None,
            document: input.shape.placeholder(),
            input,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the single terminal transition.
    ///
    /// The document is replaced as a whole, only together with `completed`.
    pub fn apply(&mut self, outcome: JobOutcome, at: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(PipelineError::InvalidTransition {
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }

        match outcome {
            JobOutcome::Completed { document } => {
                self.status = JobStatus::Completed;
                self.document = document;
                self.status_message = None;
            }
            JobOutcome::Failed { message } => {
                self.status = JobStatus::Failed;
                self.status_message = Some(message);
            }
        }
        self.updated_at = at;
        Ok(())
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            status: self.status,
        }
    }
}

/// What the caller gets back from job creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub status: JobStatus,
}
