//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides upstream error classification and the mapping from pipeline
//! failures to the short, user-visible job status messages.
//!
//! ## Error Categories
//!
//! - **RateLimit**: API rate limiting
//! - **Auth**: Authentication failures
//! - **Network**: Connectivity issues
//! - **Unavailable**: Provider unavailable
//! - **Transient**: Temporary server issues
//!
//! ## Failure Classes
//!
//! Every error that ends a generation job is reduced to a [`FailureClass`],
//! which selects the job's `status_message` and the metrics bucket.

use thiserror::Error;

use crate::constants::repair as repair_constants;

// =============================================================================
// Error Categories
// =============================================================================

/// Upstream error categories used for logging and caller retry hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited by the upstream API
    RateLimit,
    /// Context/token limit exceeded
    TokenLimit,
    /// Authentication failed
    Auth,
    /// Network/connectivity issues
    Network,
    /// Provider unavailable
    Unavailable,
    /// Invalid request
    BadRequest,
    /// Upstream returned no usable content
    EmptyResponse,
    /// Temporary server issues
    Transient,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::EmptyResponse => write!(f, "EMPTY_RESPONSE"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Whether a caller resubmitting the job is likely to succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Transient | Self::Unavailable
        )
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Upstream LLM error with category and provider context
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for logging and retry hints
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    /// Create a new LLM error
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
        }
    }

    /// Create error with provider context
    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
        }
    }

    /// Check if a resubmission is likely to succeed
    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Error classifier for upstream failures
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
        }

        if lower.contains("token")
            && (lower.contains("limit") || lower.contains("exceed") || lower.contains("maximum"))
            || lower.contains("context length")
        {
            return LlmError::with_provider(ErrorCategory::TokenLimit, message, provider);
        }

        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timed out")
            || lower.contains("unreachable")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if lower.contains("503")
            || lower.contains("502")
            || lower.contains("service unavailable")
            || lower.contains("server error")
        {
            return LlmError::with_provider(ErrorCategory::Unavailable, message, provider);
        }

        if lower.contains("overloaded") || lower.contains("temporary") {
            return LlmError::with_provider(ErrorCategory::Transient, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 | 422 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            500 | 502 | 503 | 504 => {
                LlmError::with_provider(ErrorCategory::Transient, message, provider)
            }
            404 => LlmError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Failure Classes
// =============================================================================

/// Stable classification of a failed generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// No pooled client had spare capacity
    NoCapacity,
    /// The upstream generation call failed
    Upstream,
    /// No structured payload could be located in the response
    NoStructuredOutput,
    /// The repair pass did not produce parseable output
    MalformedOutput,
    /// The parsed payload did not fit the caller's document shape
    DocumentShape,
    /// Anything else (persistence, panics)
    Internal,
}

impl FailureClass {
    pub const ALL: [FailureClass; 6] = [
        Self::NoCapacity,
        Self::Upstream,
        Self::NoStructuredOutput,
        Self::MalformedOutput,
        Self::DocumentShape,
        Self::Internal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCapacity => "no_capacity",
            Self::Upstream => "upstream",
            Self::NoStructuredOutput => "no_structured_output",
            Self::MalformedOutput => "malformed_output",
            Self::DocumentShape => "document_shape",
            Self::Internal => "internal",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::NoCapacity => 0,
            Self::Upstream => 1,
            Self::NoStructuredOutput => 2,
            Self::MalformedOutput => 3,
            Self::DocumentShape => 4,
            Self::Internal => 5,
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Generation Errors
    // -------------------------------------------------------------------------
    /// No pooled client had spare capacity
    #[error("No client capacity available ({clients} clients at capacity)")]
    NoCapacity { clients: usize },

    /// Structured upstream error with category
    #[error("LLM error: {0}")]
    Llm(LlmError),

    /// Simple upstream API error
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// Normalization found no `{` in the model output
    #[error("No structured output found in model response")]
    NormalizationEmpty,

    /// The single repair pass did not yield parseable JSON
    #[error("Failed to repair model output: {snippet}")]
    RepairExhausted { snippet: String },

    /// Parsed output does not fit the caller's document shape
    #[error("Document shape mismatch: {0}")]
    DocumentShape(String),

    /// The compensating refund call failed
    #[error("Refund failed: {0}")]
    Refund(String),

    // -------------------------------------------------------------------------
    // Job Errors
    // -------------------------------------------------------------------------
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {id} is already {status}; terminal jobs cannot transition")]
    InvalidTransition { id: String, status: String },

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    // -------------------------------------------------------------------------
    // Infrastructure Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        PipelineError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl PipelineError {
    /// Build a repair failure carrying a bounded snippet of the offending text
    pub fn repair_exhausted(candidate: &str) -> Self {
        let mut snippet: String = candidate
            .chars()
            .take(repair_constants::DIAGNOSTIC_SNIPPET_CHARS)
            .collect();
        if candidate.chars().count() > repair_constants::DIAGNOSTIC_SNIPPET_CHARS {
            snippet.push_str("...");
        }
        Self::RepairExhausted { snippet }
    }

    /// Failure class of a generation job ending with this error
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::NoCapacity { .. } => FailureClass::NoCapacity,
            Self::Llm(_) | Self::LlmApi(_) => FailureClass::Upstream,
            Self::NormalizationEmpty => FailureClass::NoStructuredOutput,
            Self::RepairExhausted { .. } | Self::Json(_) => FailureClass::MalformedOutput,
            Self::DocumentShape(_) => FailureClass::DocumentShape,
            _ => FailureClass::Internal,
        }
    }

    /// Short message stored on a failed job; never exposes internals
    pub fn status_message(&self) -> String {
        match self {
            Self::NoCapacity { .. } => "Service is at capacity, please retry shortly".to_string(),
            Self::Llm(_) | Self::LlmApi(_) => "Generation failed".to_string(),
            Self::NormalizationEmpty => "Model produced no structured output".to_string(),
            Self::RepairExhausted { snippet } => format!("Malformed model output: {}", snippet),
            Self::Json(_) => "Malformed model output".to_string(),
            Self::DocumentShape(detail) => {
                format!("Model output did not match the document shape: {}", detail)
            }
            _ => "Internal error during generation".to_string(),
        }
    }

    /// Whether resubmitting a new job is likely to succeed soon
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoCapacity { .. } => true,
            Self::Llm(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| PipelineError::Storage(format!("{}: {}", context.into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::EmptyResponse.to_string(), "EMPTY_RESPONSE");
        assert_eq!(ErrorCategory::Auth.to_string(), "AUTH");
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = ErrorClassifier::classify("Rate limit exceeded, please retry", "openai");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth() {
        let err = ErrorClassifier::classify("Invalid API key provided", "openai");
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_network() {
        let err = ErrorClassifier::classify("error sending request: connection refused", "openai");
        assert_eq!(err.category, ErrorCategory::Network);
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "Rate limited", "test");
        assert_eq!(rate_limit.category, ErrorCategory::RateLimit);

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "test");
        assert_eq!(auth.category, ErrorCategory::Auth);

        let server_error = ErrorClassifier::classify_http_status(500, "Server error", "test");
        assert_eq!(server_error.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::with_provider(ErrorCategory::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");

        let err_no_provider = LlmError::new(ErrorCategory::Network, "Connection failed");
        assert_eq!(err_no_provider.to_string(), "[NETWORK] Connection failed");
    }

    #[test]
    fn test_failure_classes_have_distinct_messages() {
        let errors = [
            PipelineError::NoCapacity { clients: 2 },
            PipelineError::LlmApi("boom".to_string()),
            PipelineError::NormalizationEmpty,
            PipelineError::repair_exhausted("{\"a\" 1}"),
            PipelineError::DocumentShape("expected object".to_string()),
            PipelineError::Storage("disk full".to_string()),
        ];

        let messages: Vec<String> = errors.iter().map(|e| e.status_message()).collect();
        for (i, message) in messages.iter().enumerate() {
            assert!(!message.is_empty());
            for other in &messages[i + 1..] {
                assert_ne!(message, other);
            }
        }

        let classes: Vec<FailureClass> = errors.iter().map(|e| e.failure_class()).collect();
        assert_eq!(classes, FailureClass::ALL.to_vec());
    }

    #[test]
    fn test_status_message_wording() {
        assert_eq!(
            PipelineError::NoCapacity { clients: 1 }.status_message(),
            "Service is at capacity, please retry shortly"
        );
        assert_eq!(
            PipelineError::NormalizationEmpty.status_message(),
            "Model produced no structured output"
        );
        assert_eq!(
            PipelineError::repair_exhausted("{\"a\" 1}").status_message(),
            "Malformed model output: {\"a\" 1}"
        );
        assert_eq!(
            PipelineError::DocumentShape("missing title".to_string()).status_message(),
            "Model output did not match the document shape: missing title"
        );
        assert_eq!(
            PipelineError::Internal("boom".to_string()).status_message(),
            "Internal error during generation"
        );
    }

    #[test]
    fn test_status_message_hides_internals() {
        let err = PipelineError::Storage("SQLITE_BUSY at /var/db/jobs.db".to_string());
        assert!(!err.status_message().contains("SQLITE"));

        let err = PipelineError::LlmApi("OpenAI API error (401): bad key sk-123".to_string());
        assert_eq!(err.status_message(), "Generation failed");
    }

    #[test]
    fn test_repair_snippet_is_bounded() {
        let long = "x".repeat(1000);
        let PipelineError::RepairExhausted { snippet } = PipelineError::repair_exhausted(&long)
        else {
            panic!("expected RepairExhausted");
        };
        assert_eq!(
            snippet.chars().count(),
            repair_constants::DIAGNOSTIC_SNIPPET_CHARS + 3
        );
    }

    #[test]
    fn test_no_capacity_is_retryable() {
        assert!(PipelineError::NoCapacity { clients: 1 }.is_retryable());
        assert!(!PipelineError::NormalizationEmpty.is_retryable());
    }
}
