//! Response Normalizer
//!
//! Isolates the candidate document inside a raw model response:
//! - Reasoning spans (`<think>…</think>`) are removed with their content
//! - Collapsible spans (`<details>…</details>`) are removed with their content
//! - The first ```` ```json ```` fenced block replaces the text when it holds a `{`
//! - Leading/trailing prose is cut by slicing from the first `{` to the last `}`
//!
//! The result is a best guess. It assumes at most one top-level object and no
//! stray braces in the surrounding prose, and is always handed to the repair
//! engine rather than trusted.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::constants::normalizer as markers;
use crate::types::{PipelineError, Result};

static REASONING_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is){}.*?(?:{}|\z)",
        regex::escape(markers::REASONING_OPEN),
        regex::escape(markers::REASONING_CLOSE)
    ))
    .expect("reasoning span pattern is valid")
});

static COLLAPSIBLE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is){}(?:\s[^>]*)?>.*?(?:{}|\z)",
        regex::escape(markers::COLLAPSIBLE_OPEN),
        regex::escape(markers::COLLAPSIBLE_CLOSE)
    ))
    .expect("collapsible span pattern is valid")
});

static PAYLOAD_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)```{}\b[^\n{{]*\n?(.*?)(?:```|\z)",
        regex::escape(markers::PAYLOAD_FENCE_LABEL)
    ))
    .expect("payload fence pattern is valid")
});

/// Extract the candidate document from a raw model response.
///
/// Fails with [`PipelineError::NormalizationEmpty`] only when no `{` is left
/// after stripping. A `{` without a later `}` yields the text from the `{`
/// onward so a truncated payload still reaches the repair engine.
pub fn normalize(raw: &str) -> Result<String> {
    let stripped = strip_collapsible(&strip_reasoning(raw));

    let working = match first_payload_fence(&stripped) {
        Some(inner) if inner.contains('{') => {
            debug!("Using first fenced payload block");
            inner
        }
        _ => stripped,
    };

    let trimmed = working.trim().trim_start_matches('\u{feff}').trim();

    if is_document(trimmed) {
        return Ok(trimmed.to_string());
    }

    match slice_braces(trimmed) {
        Some(candidate) => {
            debug!(
                original_len = trimmed.len(),
                candidate_len = candidate.len(),
                "Sliced candidate to brace span"
            );
            Ok(candidate.to_string())
        }
        None => Err(PipelineError::NormalizationEmpty),
    }
}

/// Remove reasoning spans; an unterminated one runs to the end of the text
pub fn strip_reasoning(text: &str) -> String {
    REASONING_SPAN.replace_all(text, "").into_owned()
}

/// Remove collapsible spans; an unterminated one runs to the end of the text
pub fn strip_collapsible(text: &str) -> String {
    COLLAPSIBLE_SPAN.replace_all(text, "").into_owned()
}

/// Inner content of the first payload-labeled fence
pub fn first_payload_fence(text: &str) -> Option<String> {
    PAYLOAD_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str().to_string())
}

/// Slice from the first `{` to the last `}` (or to the end if none follows)
pub fn slice_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

fn is_document(text: &str) -> bool {
    matches!(serde_json::from_str::<Value>(text), Ok(Value::Object(_)))
}
