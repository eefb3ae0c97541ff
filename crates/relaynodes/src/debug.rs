use async_trait::async_trait;
use relaycore::{
    Config, ConfigSchema, FieldKind, NodeError, Payload, Processor, ProcessorContext,
};
use relayruntime::{ProcessorFactory, ProcessorMetadata};

/// Logs its input and passes it through unchanged
pub struct DebugLogProcessor;

#[async_trait]
impl Processor for DebugLogProcessor {
    fn name(&self) -> &str {
        "debug_log"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .optional("message", FieldKind::String)
            .optional("level", FieldKind::OneOf(&["info", "warn"]))
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        let message = ctx.config_str("message", "(no message)");
        let line = format!("DEBUG {}: {} {}", ctx.node_name, message, ctx.input);

        match ctx.config_str("level", "info") {
            "warn" => {
                tracing::warn!(node_id = %ctx.node_id, "{}", line);
                ctx.events.warn(line);
            }
            _ => {
                tracing::info!(node_id = %ctx.node_id, "{}", line);
                ctx.events.info(line);
            }
        }

        // Also log upstream outputs for visibility
        for (upstream, output) in &ctx.upstream {
            ctx.events.info(format!("  {}: {}", upstream, output));
        }

        Ok(ctx.input)
    }
}

pub struct DebugLogFactory;

impl ProcessorFactory for DebugLogFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(DebugLogProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
        }
    }
}
