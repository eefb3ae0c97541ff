//! Workflow execution runtime
//!
//! This crate provides the execution engine that runs workflows: the core
//! processor registry, per-run binding resolution, the proxy to the remote
//! plugin host and DAG-based parallel execution.

pub mod catalog;
pub mod config;
mod executor;
mod graph;
mod loader;
pub mod proxy;
mod registry;
mod resolver;
mod runtime;

pub use catalog::{Catalog, CatalogClient, EventSource, EventType};
pub use config::{PluginHostConfig, RuntimeConfig};
pub use executor::WorkflowExecutor;
pub use graph::ExecutionPlan;
pub use loader::{load_workflow, parse_workflow};
pub use proxy::{CallPolicy, InvokeRequest, PdkProxyClient, PluginInvoker, ProxyError};
pub use registry::{NodeRegistry, ProcessorFactory, ProcessorInfo, ProcessorMetadata};
pub use resolver::{BindingTable, ProcessorResolver, ResolvedProcessor};
pub use runtime::{CheckError, NodeCheck, RelayRuntime, ValidationReport};
