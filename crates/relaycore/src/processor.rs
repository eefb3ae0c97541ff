use crate::{
    events::EventEmitter, Config, ConfigSchema, ExecutionId, NodeError, NodeId, Payload,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Core trait that every in-process (core tier) processor implements.
///
/// Business-tier nodes never implement this trait; they are reached only
/// through the plugin proxy.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Registry name (e.g. "input_user", "json_parse")
    fn name(&self) -> &str;

    /// Execute the processor with given context
    async fn execute(&self, ctx: ProcessorContext) -> Result<Payload, NodeError>;

    /// Declared configuration schema
    fn schema(&self) -> ConfigSchema {
        ConfigSchema::default()
    }

    /// Validate node configuration before execution
    fn validate_config(&self, config: &Config) -> Result<(), NodeError> {
        self.schema().validate(config)
    }
}

/// Everything a processor sees of the run it belongs to.
#[derive(Clone)]
pub struct ProcessorContext {
    pub node_id: NodeId,
    pub node_name: String,
    pub execution_id: ExecutionId,
    pub started_at: DateTime<Utc>,

    /// Assembled input payload (see `ExecutionContext::assemble_input`)
    pub input: Payload,

    /// Outputs of the direct upstream nodes, by node id
    pub upstream: BTreeMap<NodeId, Payload>,

    /// Static configuration for this node
    pub config: Config,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Long-running processors should poll this
    pub cancellation: CancellationToken,
}

impl ProcessorContext {
    pub fn new(node_id: impl Into<NodeId>, events: EventEmitter) -> Self {
        let node_id = node_id.into();
        Self {
            node_name: node_id.clone(),
            node_id,
            execution_id: Uuid::new_v4(),
            started_at: Utc::now(),
            input: Payload::Null,
            upstream: BTreeMap::new(),
            config: Config::new(),
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Get a field of the input payload or return error
    pub fn require_input(&self, name: &str) -> Result<&Payload, NodeError> {
        self.input
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn require_input_str(&self, name: &str) -> Result<&str, NodeError> {
        let value = self.require_input(name)?;
        value
            .as_str()
            .ok_or_else(|| NodeError::invalid_type(name, "string", value))
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Payload, NodeError> {
        self.config
            .get(name)
            .ok_or_else(|| NodeError::Validation(format!("missing required field '{}'", name)))
    }

    pub fn config_str<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.config
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }

    pub fn config_u64(&self, name: &str, default: u64) -> u64 {
        self.config
            .get(name)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }

    pub fn config_bool(&self, name: &str, default: bool) -> bool {
        self.config
            .get(name)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}
