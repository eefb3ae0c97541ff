use crate::payload_text;
use async_trait::async_trait;
use relaycore::{
    Config, ConfigSchema, FieldKind, NodeError, Payload, Processor, ProcessorContext,
};
use relayruntime::{ProcessorFactory, ProcessorMetadata};
use serde_json::{json, Map};

/// Text of the input: the configured field, the `text` field, or the whole
/// payload when it is a string.
fn input_text(ctx: &ProcessorContext) -> Result<String, NodeError> {
    if let Some(field) = ctx.config.get("field").and_then(Payload::as_str) {
        return Ok(payload_text(ctx.require_input(field)?));
    }
    match &ctx.input {
        Payload::String(s) => Ok(s.clone()),
        Payload::Object(map) => match map.get("text") {
            Some(Payload::String(s)) => Ok(s.clone()),
            _ => Err(NodeError::MissingInput("text".to_string())),
        },
        other => Err(NodeError::invalid_type("input", "string", other)),
    }
}

/// Parse a JSON string into a value
pub struct JsonParseProcessor;

#[async_trait]
impl Processor for JsonParseProcessor {
    fn name(&self) -> &str {
        "json_parse"
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let input = match &ctx.input {
            Payload::String(s) => s.as_str(),
            _ => ctx.require_input_str("json")?,
        };

        serde_json::from_str(input)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))
    }
}

pub struct JsonParseFactory;

impl ProcessorFactory for JsonParseFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(JsonParseProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
        }
    }
}

/// Stringify the input to JSON
pub struct JsonStringifyProcessor;

#[async_trait]
impl Processor for JsonStringifyProcessor {
    fn name(&self) -> &str {
        "json_stringify"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().optional("pretty", FieldKind::Bool)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let json_str = if ctx.config_bool("pretty", true) {
            serde_json::to_string_pretty(&ctx.input)
        } else {
            serde_json::to_string(&ctx.input)
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(json!({ "json": json_str }))
    }
}

pub struct JsonStringifyFactory;

impl ProcessorFactory for JsonStringifyFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(JsonStringifyProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
        }
    }
}

/// String operations on the input text
pub struct TextTransformProcessor;

#[async_trait]
impl Processor for TextTransformProcessor {
    fn name(&self) -> &str {
        "text_transform"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required(
                "operation",
                FieldKind::OneOf(&[
                    "uppercase",
                    "lowercase",
                    "trim",
                    "reverse",
                    "replace",
                    "split",
                    "length",
                ]),
            )
            .optional("field", FieldKind::String)
            .optional("from", FieldKind::String)
            .optional("to", FieldKind::String)
            .optional("separator", FieldKind::String)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let text = input_text(&ctx)?;

        let output = match ctx.config_str("operation", "") {
            "uppercase" => json!({ "text": text.to_uppercase() }),
            "lowercase" => json!({ "text": text.to_lowercase() }),
            "trim" => json!({ "text": text.trim() }),
            "reverse" => json!({ "text": text.chars().rev().collect::<String>() }),
            "replace" => {
                let from = ctx.config_str("from", "");
                if from.is_empty() {
                    return Err(NodeError::Validation(
                        "'replace' needs a non-empty 'from' field".to_string(),
                    ));
                }
                json!({ "text": text.replace(from, ctx.config_str("to", "")) })
            }
            "split" => {
                let separator = ctx.config_str("separator", "\n");
                let parts: Vec<&str> = text.split(separator).collect();
                json!({ "parts": parts, "count": parts.len() })
            }
            "length" => json!({
                "length": text.chars().count(),
                "words": text.split_whitespace().count(),
            }),
            other => {
                return Err(NodeError::Validation(format!(
                    "unknown operation '{}'",
                    other
                )))
            }
        };

        Ok(output)
    }
}

pub struct TextTransformFactory;

impl ProcessorFactory for TextTransformFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(TextTransformProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Case, trim, replace, split and length of text".to_string(),
            category: "transform".to_string(),
        }
    }
}

/// Reshapes an object input: `pick`, then `rename`, then `set`
pub struct DataTransformProcessor;

#[async_trait]
impl Processor for DataTransformProcessor {
    fn name(&self) -> &str {
        "data_transform"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("pick", FieldKind::Array)
            .optional("rename", FieldKind::Object)
            .optional("set", FieldKind::Object)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let mut data = match &ctx.input {
            Payload::Object(map) => map.clone(),
            other => return Err(NodeError::invalid_type("input", "object", other)),
        };

        if let Some(Payload::Array(keys)) = ctx.config.get("pick") {
            let keys: Vec<&str> = keys.iter().filter_map(Payload::as_str).collect();
            data.retain(|k, _| keys.contains(&k.as_str()));
        }

        if let Some(Payload::Object(renames)) = ctx.config.get("rename") {
            for (from, to) in renames {
                let Some(to) = to.as_str() else {
                    return Err(NodeError::Validation(format!(
                        "rename target for '{}' must be a string",
                        from
                    )));
                };
                if let Some(value) = data.remove(from) {
                    data.insert(to.to_string(), value);
                }
            }
        }

        if let Some(Payload::Object(values)) = ctx.config.get("set") {
            for (key, value) in values {
                data.insert(key.clone(), value.clone());
            }
        }

        Ok(Payload::Object(data))
    }
}

pub struct DataTransformFactory;

impl ProcessorFactory for DataTransformFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(DataTransformProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Pick, rename and set fields of an object".to_string(),
            category: "transform".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycore::EventBus;
    use uuid::Uuid;

    fn context(input: Payload) -> ProcessorContext {
        let bus = EventBus::new(16);
        ProcessorContext::new("t", bus.create_emitter(Uuid::new_v4(), "t".to_string()))
            .with_input(input)
    }

    #[tokio::test]
    async fn text_comes_from_field_text_or_string_input() {
        let ctx = context(json!({"text": "abc"}));
        assert_eq!(input_text(&ctx).unwrap(), "abc");

        let ctx = context(json!("xyz"));
        assert_eq!(input_text(&ctx).unwrap(), "xyz");

        let ctx = context(json!({"body": 5})).with_config("field", "body");
        assert_eq!(input_text(&ctx).unwrap(), "5");

        let ctx = context(json!(42));
        assert!(matches!(
            input_text(&ctx),
            Err(NodeError::InvalidInputType { .. })
        ));
    }

    #[tokio::test]
    async fn rename_requires_string_targets() {
        let ctx = context(json!({"a": 1})).with_config("rename", json!({"a": 2}));
        let err = DataTransformProcessor.execute(ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }
}
