use async_trait::async_trait;
use relaycore::{
    Config, ConfigSchema, FieldKind, NodeError, Payload, Processor, ProcessorContext,
};
use relayruntime::{ProcessorFactory, ProcessorMetadata};
use tokio::time::{sleep, Duration};

/// Delay execution for a specified duration, then pass the input through
pub struct DelayProcessor;

#[async_trait]
impl Processor for DelayProcessor {
    fn name(&self) -> &str {
        "delay"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().optional("delay_ms", FieldKind::Integer)
    }

    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError> {
        // Default to 1 second if not specified
        let delay_ms = ctx.config_u64("delay_ms", 1000);

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        // Report halfway and on completion
        let half = Duration::from_millis(delay_ms / 2);
        for (step, percent) in [(half, 50.0), (Duration::from_millis(delay_ms) - half, 100.0)] {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                _ = sleep(step) => ctx.events.progress(percent, None),
            }
        }

        Ok(ctx.input)
    }
}

pub struct DelayFactory;

impl ProcessorFactory for DelayFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Processor>, NodeError> {
        Ok(Box::new(DelayProcessor))
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
