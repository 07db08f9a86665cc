//! AI Response Validation
//!
//! Turns a free-text model response into a document that fits the caller's
//! shape:
//! - Normalization isolates the candidate payload
//! - One structural repair pass fixes common syntax defects
//! - The parsed value is conformed to the [`DocumentShape`]
//!
//! ## Design Philosophy
//! - Every step is a pure function over text, free of I/O
//! - Each failure maps to a distinct error so operators can tell
//!   "no structured output" from "malformed output"

mod normalizer;
mod repair;

pub use normalizer::{
    first_payload_fence, normalize, slice_braces, strip_collapsible, strip_reasoning,
};
pub use repair::{
    REPAIR_PASS, RepairOutcome, RepairRule, close_unbalanced, collapse_duplicate_separators,
    fill_dangling_keys, quote_bare_keys, remove_trailing_separators, repair_and_parse,
    run_repair_pass, truncate_after_last_brace,
};

use serde_json::Value;

use crate::types::{DocumentShape, Result};

/// Unified validation pipeline combining all validation steps
#[derive(Debug, Clone, Default)]
pub struct ValidationPipeline {
    shape: DocumentShape,
}

impl ValidationPipeline {
    pub fn new(shape: DocumentShape) -> Self {
        Self { shape }
    }

    /// Process raw LLM response through full validation pipeline
    ///
    /// Steps:
    /// 1. Normalize the raw text to a candidate payload
    /// 2. Parse, repairing once if needed
    /// 3. Conform to the document shape
    pub fn process(&self, raw_response: &str) -> Result<ProcessedResponse> {
        let candidate = normalize(raw_response)?;
        let RepairOutcome { value, repaired } = repair_and_parse(&candidate)?;
        let document = self.shape.conform(value)?;

        Ok(ProcessedResponse {
            document,
            was_repaired: repaired,
        })
    }
}

/// Result of full validation pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResponse {
    /// Parsed, shape-conformed document
    pub document: Value,
    /// Whether the repair pass was needed
    pub was_repaired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PipelineError;
    use serde_json::json;

    #[test]
    fn test_pipeline_fenced_trailing_comma() {
        let pipeline = ValidationPipeline::default();
        let raw = "Here's your JSON:\n```json\n{\"a\":1,}\n```\nHope that helps!";

        let result = pipeline.process(raw).unwrap();
        assert!(result.was_repaired);
        assert_eq!(result.document, json!({"a": 1}));
    }

    #[test]
    fn test_pipeline_valid_response() {
        let shape = DocumentShape::from_value(json!({"title": "", "sections": []})).unwrap();
        let pipeline = ValidationPipeline::new(shape);

        let result = pipeline
            .process(r#"{"title": "Launch", "sections": ["intro"]}"#)
            .unwrap();
        assert!(!result.was_repaired);
        assert_eq!(result.document["title"], "Launch");
    }

    #[test]
    fn test_pipeline_fills_shape_defaults() {
        let shape = DocumentShape::from_value(json!({"title": "", "tags": []})).unwrap();
        let pipeline = ValidationPipeline::new(shape);

        let result = pipeline.process("<think>hmm</think>{title: \"T\"}").unwrap();
        assert!(result.was_repaired);
        assert_eq!(result.document, json!({"title": "T", "tags": []}));
    }

    #[test]
    fn test_pipeline_distinguishes_failures() {
        let pipeline = ValidationPipeline::default();

        assert!(matches!(
            pipeline.process("no payload here").unwrap_err(),
            PipelineError::NormalizationEmpty
        ));
        assert!(matches!(
            pipeline.process(r#"{"a" 1}"#).unwrap_err(),
            PipelineError::RepairExhausted { .. }
        ));
    }

    #[test]
    fn test_pipeline_shape_mismatch() {
        let shape = DocumentShape::from_value(json!({"sections": []})).unwrap();
        let pipeline = ValidationPipeline::new(shape);

        assert!(matches!(
            pipeline.process(r#"{"sections": "none"}"#).unwrap_err(),
            PipelineError::DocumentShape(_)
        ));
    }
}
