//! LLM Provider Abstraction
//!
//! Defines the LlmProvider trait for raw-text generation against an upstream
//! model. Providers return the model's text untouched; turning it into a
//! document is the job of [`crate::ai::validation`].
//!
//! ## Modules
//!
//! - `openai`: OpenAI-compatible Chat Completions client (blocking + SSE streaming)
//! - `prompt_utils`: Prompt assembly from a generation request

#[cfg(test)]
pub(crate) mod mock;
mod openai;
mod prompt_utils;

pub use openai::{OpenAiProvider, SseDecoder, SseEvent};
pub use prompt_utils::build_generation_prompt;

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, Result};

// =============================================================================
// LLM Response with Usage Metrics
// =============================================================================

/// Complete LLM response including raw content and usage metrics
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Raw generated text
    pub content: String,
    /// Token usage metrics
    pub usage: TokenUsage,
    /// Response timing
    pub timing: ResponseTiming,
    /// Provider and model info
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with content only (usage unknown)
    pub fn content_only(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Token usage metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used (input + output)
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Create from OpenAI-style usage response
    pub fn from_openai(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            input_tokens: prompt_tokens,
            output_tokens: completion_tokens,
        }
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Total response time in milliseconds (wall clock)
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Model used
    pub model: String,
    /// Provider name
    pub provider: String,
}

/// Stream of raw text chunks from a streaming generation call
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Shared LLM provider type for concurrent access from job tasks.
pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

/// Concatenate a chunk stream into the full response text.
///
/// The first failing chunk aborts the collection. An empty result is an
/// upstream failure.
pub async fn collect_stream(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }

    if text.trim().is_empty() {
        return Err(PipelineError::Llm(LlmError::new(
            ErrorCategory::EmptyResponse,
            "Streaming response contained no text",
        )));
    }
    Ok(text)
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one upstream client
///
/// Note: API keys are never serialized to output and are redacted in debug
/// output. Each provider converts the key to SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "openai"
    pub provider: String,
    /// Default model name (provider-specific)
    pub model: Option<String>,
    /// Optional request timeout in seconds; unset means no timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Temperature for LLM generation
    pub temperature: f32,
    /// API key
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            timeout_secs: None,
            temperature: 0.7,
            api_key: None,
            api_base: None,
            max_tokens: crate::constants::network::DEFAULT_MAX_TOKENS,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Upstream generation call
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a complete response (non-streaming)
    async fn generate(&self, model: &str, prompt: &str) -> Result<LlmResponse>;

    /// Generate a response as a stream of text chunks.
    ///
    /// The default implementation yields the non-streaming response as one chunk.
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TextStream> {
        let response = self.generate(model, prompt).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(response.content)
        })))
    }

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Create a shared provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config.clone())?)),
        _ => Err(PipelineError::Config(format!(
            "Unknown provider: {}. Supported: openai",
            config.provider
        ))),
    }
}
