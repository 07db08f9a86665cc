//! Document shape
//!
//! The caller describes the document it expects as a JSON template object
//! whose values are the defaults of each top-level field. The template is the
//! placeholder stored on a new job and the contract a parsed model response
//! is conformed to.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{PipelineError, Result};

/// Caller-supplied template of the generated document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentShape(Map<String, Value>);

impl DocumentShape {
    pub fn new(template: Map<String, Value>) -> Self {
        Self(template)
    }

    /// Build from an arbitrary JSON value; only objects are accepted
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PipelineError::InvalidRequest(format!(
                "document shape must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Default-shaped document stored on a job until generation completes
    pub fn placeholder(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Fit a parsed model response to this shape.
    ///
    /// Missing or null top-level fields take the template default. A field
    /// whose type differs from a non-null default is rejected. Extra fields
    /// are kept.
    pub fn conform(&self, value: Value) -> Result<Value> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(PipelineError::DocumentShape(format!(
                    "expected a JSON object, got {}",
                    json_type_name(&other)
                )));
            }
        };

        for (field, default) in &self.0 {
            match object.get(field) {
                None | Some(Value::Null) => {
                    object.insert(field.clone(), default.clone());
                }
                Some(actual) => {
                    if !default.is_null() && json_type_name(actual) != json_type_name(default) {
                        return Err(PipelineError::DocumentShape(format!(
                            "field '{}' expected {}, got {}",
                            field,
                            json_type_name(default),
                            json_type_name(actual)
                        )));
                    }
                }
            }
        }

        Ok(Value::Object(object))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
