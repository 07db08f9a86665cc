//! OpenAI API Provider
//!
//! LLM provider using the OpenAI-compatible Chat Completions API.
//! Supports a single-shot call and Server-Sent Events streaming; both return
//! the model's raw text.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    ErrorCategory, ErrorClassifier, LlmError, LlmProvider, LlmResponse, ProviderConfig,
    ResponseMetadata, ResponseTiming, TextStream, TokenUsage,
};
use crate::constants::network::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::types::{PipelineError, Result};

const PROVIDER_NAME: &str = "openai";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                PipelineError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or provide api_key_env in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        url::Url::parse(&api_base)
            .map_err(|e| PipelineError::Config(format!("Invalid api_base '{}': {}", api_base, e)))?;
        let api_base = api_base.trim_end_matches('/').to_string();

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn build_request(&self, model: &str, prompt: &str, stream: bool) -> ChatCompletionRequest {
        let model = if model.trim().is_empty() {
            self.model.clone()
        } else {
            model.to_string()
        };

        ChatCompletionRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You generate structured documents. Always respond with a single JSON object.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream,
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(model = %request.model, stream = request.stream, "Sending request to OpenAI API");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Llm(ErrorClassifier::classify(
                    &format!("OpenAI request failed: {}", e),
                    PROVIDER_NAME,
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Llm(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &body,
                PROVIDER_NAME,
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, model: &str, prompt: &str) -> Result<LlmResponse> {
        let start_time = Instant::now();
        let request = self.build_request(model, prompt, false);
        info!(
            "Generating with OpenAI (model: {}, temperature: {})",
            request.model, self.temperature
        );

        let response = self.send(&request).await?;
        let elapsed = start_time.elapsed();

        let response_body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::LlmApi(format!("Failed to parse OpenAI response: {}", e)))?;

        let usage = response_body
            .usage
            .map(|u| TokenUsage::from_openai(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let content = response_body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Llm(LlmError::with_provider(
                    ErrorCategory::EmptyResponse,
                    "No content in OpenAI response",
                    PROVIDER_NAME,
                ))
            })?;

        Ok(LlmResponse {
            content,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: request.model,
                provider: PROVIDER_NAME.to_string(),
            },
        })
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TextStream> {
        let request = self.build_request(model, prompt, true);
        info!("Streaming with OpenAI (model: {})", request.model);

        let response = self.send(&request).await?;
        Ok(text_chunks(Box::pin(response.bytes_stream())))
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// =============================================================================
// Server-Sent Events decoding
// =============================================================================

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental SSE decoder over arbitrary byte chunk boundaries
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        events
    }

    /// Flush a trailing line and any undispatched data at end of stream
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.dispatch(events);
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data
                .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        if self.data.is_empty() {
            return;
        }
        let payload = std::mem::take(&mut self.data).join("\n");
        if payload.trim() == "[DONE]" {
            events.push(SseEvent::Done);
        } else {
            events.push(SseEvent::Data(payload));
        }
    }
}

struct ChunkState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> ChunkState<S> {
    fn absorb(&mut self, events: Vec<SseEvent>) -> Result<()> {
        for event in events {
            match event {
                SseEvent::Done => {
                    self.finished = true;
                    break;
                }
                SseEvent::Data(payload) => {
                    let chunk: ChatCompletionChunk = serde_json::from_str(&payload).map_err(|e| {
                        PipelineError::LlmApi(format!("Failed to parse OpenAI stream chunk: {}", e))
                    })?;
                    self.pending.extend(
                        chunk
                            .choices
                            .into_iter()
                            .filter_map(|c| c.delta.content)
                            .filter(|c| !c.is_empty()),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Turn a raw SSE byte stream into a stream of content deltas
fn text_chunks<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = ChunkState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }

            let events = match state.bytes.next().await {
                Some(Ok(chunk)) => state.decoder.push(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    let err = PipelineError::Llm(ErrorClassifier::classify(
                        &format!("OpenAI stream interrupted: {}", e),
                        PROVIDER_NAME,
                    ));
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    state.decoder.finish()
                }
            };

            if let Err(e) = state.absorb(events) {
                state.finished = true;
                state.pending.clear();
                return Some((Err(e), state));
            }
        }
    }))
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}
