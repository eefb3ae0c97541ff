use crate::payload_text;
use async_trait::async_trait;
use relaycore::{
    Config, ConfigSchema, FieldKind, NodeError, Payload, Processor, ProcessorContext,
};
use relayruntime::{ProcessorFactory, ProcessorMetadata};
use serde_json::json;

/// Deterministic stand-in for a language model call.
///
/// Builds the prompt the way a real model node would and echoes it back, so
/// chat-shaped workflows run without a model provider.
pub struct LlmStubProcessor;

impl LlmStubProcessor {
    fn prompt(ctx: &ProcessorContext) -> String {
        let text = ["prompt", "query", "text", "message"]
            .iter()
            .find_map(|key| ctx.input.get(*key).and_then(Payload::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| payload_text(&ctx.input));

        match ctx.config.get("prompt_template").and_then(Payload::as_str) {
            Some(template) => template.replace("{{input}}", &text),
            None => text,
        }
    }
}

#[async_trait]
impl Processor for LlmStubProcessor {
    fn name(&self) -> &str {
        "llm_stub"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("model", FieldKind::String)
            .optional("prompt_template", FieldKind::String)
            .optional("response", FieldKind::String)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let model = ctx.config_str("model", "stub");
        let prompt = Self::prompt(&ctx);

        let response = match ctx.config.get("response").and_then(Payload::as_str) {
            Some(fixed) => fixed.to_string(),
            None => format!("[{}] {}", model, prompt),
        };
        ctx.events.info(format!("{} answered {} chars", model, response.len()));

        Ok(json!({
            "model": model,
            "prompt": prompt,
            "response": response,
            "usage": {
                "prompt_tokens": prompt.split_whitespace().count(),
                "completion_tokens": response.split_whitespace().count(),
            },
        }))
    }
}

pub struct LlmStubFactory;

impl ProcessorFactory for LlmStubFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(LlmStubProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Offline language model stand-in that echoes its prompt".to_string(),
            category: "llm".to_string(),
        }
    }
}
