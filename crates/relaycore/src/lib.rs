//! Core abstractions for the relay workflow runtime
//!
//! This crate provides the data model shared by every other crate: workflow
//! definitions, processor bindings, the per-run execution context, run
//! outcomes and the error taxonomy. It does no I/O of its own.

mod binding;
mod context;
mod error;
pub mod events;
mod outcome;
mod processor;
mod schema;
mod workflow;

pub use binding::ProcessorBinding;
pub use context::{ExecutionContext, NodeResult, SkipReason};
pub use error::{ConfigError, ErrorKind, FlowError, NodeError, RegistryError, WorkflowError};
pub use events::*;
pub use outcome::{NodeReport, RunOutcome, RunStatus};
pub use processor::{Processor, ProcessorContext};
pub use schema::{ConfigSchema, FieldKind, FieldSpec};
pub use workflow::{Edge, NodeId, NodeSpec, PluginBinding, Workflow, WorkflowId, WorkflowSettings};

/// Opaque JSON payload exchanged between nodes
pub type Payload = serde_json::Value;

/// Node configuration mapping
pub type Config = serde_json::Map<String, serde_json::Value>;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
