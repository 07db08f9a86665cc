//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Response normalizer markers
pub mod normalizer {
    /// Opening tag of a model reasoning trace
    pub const REASONING_OPEN: &str = "<think>";

    /// Closing tag of a model reasoning trace
    pub const REASONING_CLOSE: &str = "</think>";

    /// Opening tag of a collapsible explanatory span (attributes allowed)
    pub const COLLAPSIBLE_OPEN: &str = "<details";

    /// Closing tag of a collapsible explanatory span
    pub const COLLAPSIBLE_CLOSE: &str = "</details>";

    /// Language label of the fenced block that carries the payload
    pub const PAYLOAD_FENCE_LABEL: &str = "json";
}

/// Structural repair constants
pub mod repair {
    /// Maximum characters of malformed output kept for operator diagnostics
    pub const DIAGNOSTIC_SNIPPET_CHARS: usize = 120;
}

/// Client pool constants
pub mod pool {
    /// Capacity used when a client entry omits one
    pub const DEFAULT_CLIENT_CAPACITY: u32 = 4;
}

/// Job lifecycle constants
pub mod jobs {
    /// Poll interval used when waiting for a job to reach a terminal state
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

    /// Default page size when listing jobs
    pub const DEFAULT_LIST_LIMIT: usize = 20;
}

/// Billing constants
pub mod billing {
    /// Credits returned for one failed unit of work
    pub const REFUND_CREDITS: u32 = 1;

    /// Upper bound on one refund request, connect included
    pub const REFUND_TIMEOUT_SECS: u64 = 10;
}

/// Network constants
pub mod network {
    /// Default OpenAI-compatible API base
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

    /// Default model
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

    /// Default completion token ceiling
    pub const DEFAULT_MAX_TOKENS: usize = 4096;
}
