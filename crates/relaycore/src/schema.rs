//! Declared configuration schemas for core processors.

use crate::error::json_type_name;
use crate::{Config, NodeError};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Bool,
    Object,
    Array,
    /// A string restricted to the listed values.
    OneOf(&'static [&'static str]),
    Any,
}

impl FieldKind {
    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_u64() || value.is_i64(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::OneOf(allowed) => value
                .as_str()
                .map(|s| allowed.iter().any(|a| *a == s))
                .unwrap_or(false),
            FieldKind::Any => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            FieldKind::String => "a string".to_string(),
            FieldKind::Number => "a number".to_string(),
            FieldKind::Integer => "an integer".to_string(),
            FieldKind::Bool => "a boolean".to_string(),
            FieldKind::Object => "an object".to_string(),
            FieldKind::Array => "an array".to_string(),
            FieldKind::OneOf(allowed) => format!("one of [{}]", allowed.join(", ")),
            FieldKind::Any => "any value".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// Typed description of the configuration a processor accepts.
///
/// Fields not declared in the schema are ignored.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigSchema {
    pub fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
        });
        self
    }

    pub fn validate(&self, config: &Config) -> Result<(), NodeError> {
        for field in &self.fields {
            match config.get(field.name) {
                None | Some(serde_json::Value::Null) if field.required => {
                    return Err(NodeError::Validation(format!(
                        "missing required field '{}'",
                        field.name
                    )));
                }
                None | Some(serde_json::Value::Null) => {}
                Some(value) if !field.kind.accepts(value) => {
                    return Err(NodeError::Validation(format!(
                        "field '{}' must be {}, got {}",
                        field.name,
                        field.kind.describe(),
                        json_type_name(value)
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
