//! Scripted provider for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{ErrorCategory, LlmError, LlmProvider, LlmResponse, TextStream, TokenUsage};
use crate::types::{PipelineError, Result};

#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Text(String),
    Chunks(Vec<String>),
    Fail(ErrorCategory),
    Panic,
}

pub(crate) struct MockProvider {
    reply: MockReply,
    calls: AtomicU32,
    gate: Option<Arc<Notify>>,
}

impl MockProvider {
    pub(crate) fn new(reply: MockReply) -> Self {
        Self {
            reply,
            calls: AtomicU32::new(0),
            gate: None,
        }
    }

    pub(crate) fn text(content: &str) -> Self {
        Self::new(MockReply::Text(content.to_string()))
    }

    /// Hold every call until the gate is notified
    pub(crate) fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, _model: &str, _prompt: &str) -> Result<LlmResponse> {
        self.enter().await;
        match &self.reply {
            MockReply::Text(text) => {
                let mut response = LlmResponse::content_only(text.clone());
                response.usage = TokenUsage::from_openai(10, 5);
                Ok(response)
            }
            MockReply::Chunks(chunks) => Ok(LlmResponse::content_only(chunks.concat())),
            MockReply::Fail(category) => Err(PipelineError::Llm(LlmError::with_provider(
                *category,
                "mock upstream failure",
                "mock",
            ))),
            MockReply::Panic => panic!("mock provider panicked"),
        }
    }

    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<TextStream> {
        if let MockReply::Chunks(chunks) = &self.reply {
            self.enter().await;
            let items: Vec<Result<String>> = chunks.iter().cloned().map(Ok).collect();
            return Ok(Box::pin(futures::stream::iter(items)));
        }
        let response = self.generate(model, prompt).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(response.content)
        })))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
