pub mod error;
pub mod job;
pub mod shape;

pub use error::{
    ErrorCategory, ErrorClassifier, FailureClass, LlmError, PipelineError, Result, ResultExt,
};
pub use job::{GenerationJob, GenerationRequest, JobHandle, JobId, JobOutcome, JobStatus};
pub use shape::DocumentShape;
