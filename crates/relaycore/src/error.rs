use crate::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Classification of a node-local failure, as reported in a run outcome.
///
/// `UnresolvedProcessor` and `ValidationError` point at the workflow or the
/// core library; `ConnectionError`, `TimeoutError` and `RemoteExecutionError`
/// point at the plugin host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnresolvedProcessor,
    ConnectionError,
    RemoteExecutionError,
    TimeoutError,
    ValidationError,
    ExecutionError,
    Cancelled,
}

impl ErrorKind {
    /// True when the failure originates from the remote plugin host.
    pub fn is_plugin_host(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionError | ErrorKind::RemoteExecutionError | ErrorKind::TimeoutError
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnresolvedProcessor => "UnresolvedProcessor",
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::RemoteExecutionError => "RemoteExecutionError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::ExecutionError => "ExecutionError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error(
        "'{name}' is not a core processor (core processors: [{available}]); \
         business processors require a plugin binding (plugin_id, node_id) on the node"
    )]
    UnresolvedProcessor { name: String, available: String },

    #[error("plugin host unreachable at {url}: {message}")]
    Connection { url: String, message: String },

    /// Message reported by the remote node, verbatim.
    #[error("{0}")]
    RemoteExecution(String),

    #[error("plugin host gave no response within {timeout_ms}ms after {attempts} attempt(s)")]
    Timeout { attempts: u32, timeout_ms: u64 },

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::UnresolvedProcessor { .. } => ErrorKind::UnresolvedProcessor,
            NodeError::Connection { .. } => ErrorKind::ConnectionError,
            NodeError::RemoteExecution(_) => ErrorKind::RemoteExecutionError,
            NodeError::Timeout { .. } => ErrorKind::TimeoutError,
            NodeError::Validation(_) => ErrorKind::ValidationError,
            NodeError::MissingInput(_)
            | NodeError::InvalidInputType { .. }
            | NodeError::ExecutionFailed(_) => ErrorKind::ExecutionError,
            NodeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn invalid_type(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: &serde_json::Value,
    ) -> Self {
        NodeError::InvalidInputType {
            field: field.into(),
            expected: expected.into(),
            actual: json_type_name(actual).to_string(),
        }
    }
}

/// Graph-level errors. Any of these aborts the run before a node is dispatched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow has no nodes")]
    Empty,

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Edge {from} -> {to} references unknown node '{missing}'")]
    DanglingEdge {
        from: NodeId,
        to: NodeId,
        missing: NodeId,
    },

    #[error("Cyclic dependency detected involving node '{0}'")]
    CyclicGraph(NodeId),

    #[error("Invalid workflow: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Processor '{0}' is already registered")]
    DuplicateRegistration(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
