//! genpipe - Asynchronous LLM Generation Pipeline
//!
//! Accepts generation requests, runs them as background jobs against a pool
//! of upstream LLM clients, and turns free-form model output into a
//! structured document that matches a caller-supplied shape.
//!
//! ## Core Features
//!
//! - **Client Pool**: capacity-bounded leasing across several credentials
//! - **Response Normalizer**: strips reasoning traces and collapsible spans, extracts fenced payloads
//! - **Structural Repair**: fixes the common JSON breakages of model output
//! - **Job Lifecycle**: `processing` placeholder, one terminal transition, refund on failure
//!
//! ## Quick Start
//!
//! ```ignore
//! use genpipe::{ConfigLoader, GenerationRequest, JobManager};
//!
//! let config = ConfigLoader::load()?;
//! let manager = JobManager::from_config(&config)?;
//! let handle = manager.submit("alice", GenerationRequest::new("Describe a cat")).await?;
//! let job = manager.wait_for_terminal(&handle.id, Duration::from_millis(500)).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: providers, client pool, normalization and repair, metrics
//! - [`pipeline`]: job submission and background execution
//! - [`storage`]: job records in memory or SQLite
//! - [`billing`]: credit refunds for failed jobs
//! - [`config`]: layered configuration

pub mod ai;
pub mod billing;
pub mod cli;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, FailureClass, PipelineError, Result, ResultExt};

// Job Model
pub use types::{
    DocumentShape, GenerationJob, GenerationRequest, JobHandle, JobId, JobOutcome, JobStatus,
};

// Storage
pub use storage::{Database, JobStore, MemoryJobStore, SharedJobStore, SqliteJobStore};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use billing::{CreditLedger, RefundRequest, SharedLedger};
pub use pipeline::JobManager;

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    ClientLease, ClientPool, LlmProvider, LlmResponse, PipelineMetrics, ProcessedResponse,
    SharedMetrics, ValidationPipeline,
};
