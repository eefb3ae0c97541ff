//! Workflow boundary processors: where data enters and leaves a run.

use crate::payload_text;
use async_trait::async_trait;
use relaycore::{
    Config, ConfigSchema, FieldKind, NodeError, Payload, Processor, ProcessorContext,
};
use relayruntime::{ProcessorFactory, ProcessorMetadata};
use serde_json::json;
use tokio::io::AsyncWriteExt;

/// Hands the run input (or a configured default) to the rest of the graph
pub struct UserInputProcessor;

#[async_trait]
impl Processor for UserInputProcessor {
    fn name(&self) -> &str {
        "input_user"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("default", FieldKind::Any)
            .optional("required", FieldKind::Bool)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        if !ctx.input.is_null() {
            return Ok(ctx.input);
        }
        if let Some(default) = ctx.config.get("default") {
            ctx.events.info("No input given, using configured default");
            return Ok(default.clone());
        }
        if ctx.config_bool("required", false) {
            return Err(NodeError::MissingInput("input".to_string()));
        }
        Ok(Payload::Null)
    }
}

/// Reads a file as text or JSON
pub struct FileInputProcessor;

#[async_trait]
impl Processor for FileInputProcessor {
    fn name(&self) -> &str {
        "input_file"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("path", FieldKind::String)
            .optional("format", FieldKind::OneOf(&["text", "json"]))
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let path = match ctx.config.get("path").and_then(Payload::as_str) {
            Some(path) => path.to_string(),
            None => ctx.require_input_str("path")?.to_string(),
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("cannot read '{}': {}", path, e)))?;
        ctx.events.info(format!("Read {} bytes from {}", content.len(), path));

        let size = content.len();
        let content = match ctx.config_str("format", "text") {
            "json" => serde_json::from_str(&content).map_err(|e| {
                NodeError::ExecutionFailed(format!("'{}' is not valid JSON: {}", path, e))
            })?,
            _ => Payload::String(content),
        };

        Ok(json!({
            "path": path,
            "content": content,
            "size": size,
        }))
    }
}

/// Renders the input as text, optionally through a `{{input}}` template
pub struct TextOutputProcessor;

#[async_trait]
impl Processor for TextOutputProcessor {
    fn name(&self) -> &str {
        "output_text"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("template", FieldKind::String)
            .optional("field", FieldKind::String)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let value = match ctx.config.get("field").and_then(Payload::as_str) {
            Some(field) => ctx.require_input(field)?,
            None => &ctx.input,
        };
        let text = payload_text(value);

        let text = match ctx.config.get("template").and_then(Payload::as_str) {
            Some(template) => template.replace("{{input}}", &text),
            None => text,
        };

        Ok(json!({ "text": text }))
    }
}

/// Writes the input to a file
pub struct FileOutputProcessor;

#[async_trait]
impl Processor for FileOutputProcessor {
    fn name(&self) -> &str {
        "output_file"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("path", FieldKind::String)
            .optional("append", FieldKind::Bool)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let path = ctx.config_str("path", "");
        let append = ctx.config_bool("append", false);
        let text = match &ctx.input {
            Payload::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other)
                .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("cannot open '{}': {}", path, e)))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("cannot write '{}': {}", path, e)))?;
        file.flush()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("cannot write '{}': {}", path, e)))?;

        ctx.events.info(format!("Wrote {} bytes to {}", text.len(), path));

        Ok(json!({
            "path": path,
            "bytes_written": text.len(),
        }))
    }
}

pub struct UserInputFactory;

impl ProcessorFactory for UserInputFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(UserInputProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Passes the run input into the workflow".to_string(),
            category: "input".to_string(),
        }
    }
}

pub struct FileInputFactory;

impl ProcessorFactory for FileInputFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(FileInputProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Reads a local file as text or JSON".to_string(),
            category: "input".to_string(),
        }
    }
}

pub struct TextOutputFactory;

impl ProcessorFactory for TextOutputFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(TextOutputProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Renders the input as text".to_string(),
            category: "output".to_string(),
        }
    }
}

pub struct FileOutputFactory;

impl ProcessorFactory for FileOutputFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(FileOutputProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Writes the input to a local file".to_string(),
            category: "output".to_string(),
        }
    }
}
