//! AI Integration Layer
//!
//! Upstream model access and response handling for generation jobs.

pub mod metrics;
pub mod pool;
pub mod provider;
pub mod validation;

pub use metrics::{
    FailureCount, MetricsSummary, PipelineMetrics, SharedMetrics, create_shared_metrics,
};
pub use pool::{ClientLease, ClientPool, ClientUsage, PooledClient};
pub use provider::{
    ErrorCategory, ErrorClassifier, LlmError, LlmProvider, LlmResponse, ProviderConfig,
    ResponseMetadata, ResponseTiming, SharedProvider, TextStream, TokenUsage, collect_stream,
    create_provider,
};
pub use validation::{ProcessedResponse, ValidationPipeline};
