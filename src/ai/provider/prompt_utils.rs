//! Prompt building utilities for LLM providers.
//!
//! Assembles the user prompt from a generation request: the caller's prompt,
//! its parameters, and the document shape the reply should fill.

use serde_json::Value;

use crate::types::GenerationRequest;

/// Build the full prompt for a generation request.
///
/// Parameters and shape sections are omitted when empty.
pub fn build_generation_prompt(request: &GenerationRequest) -> String {
    let mut prompt = request.prompt.trim().to_string();

    if !is_empty_value(&request.parameters) {
        let params = serde_json::to_string_pretty(&request.parameters).unwrap_or_default();
        prompt.push_str("\n\n---\n\nInput parameters:\n```json\n");
        prompt.push_str(&params);
        prompt.push_str("\n```");
    }

    if !request.shape.is_empty() {
        let shape = serde_json::to_string_pretty(&request.shape).unwrap_or_default();
        prompt.push_str(
            "\n\n---\n\nRespond with a single JSON object with these fields (values shown are defaults):\n```json\n",
        );
        prompt.push_str(&shape);
        prompt.push_str("\n```\n\nRespond ONLY with valid JSON, no explanation.");
    }

    prompt
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
