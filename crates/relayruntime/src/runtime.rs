use crate::config::RuntimeConfig;
use crate::graph::ExecutionPlan;
use crate::proxy::{PdkProxyClient, PluginInvoker};
use crate::registry::NodeRegistry;
use crate::resolver::{ProcessorResolver, ResolvedProcessor};
use crate::WorkflowExecutor;
use relaycore::{
    ErrorKind, EventBus, ExecutionEvent, NodeError, NodeId, Payload, ProcessorBinding,
    RunOutcome, Workflow, WorkflowError,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main runtime for executing workflows.
///
/// Holds the process-wide pieces: the read-only core registry, the plugin
/// proxy and the event bus. Every run gets its own execution context.
pub struct RelayRuntime {
    registry: Arc<NodeRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl RelayRuntime {
    /// Create a runtime that reaches business nodes over HTTP
    pub fn new(registry: NodeRegistry, config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(registry), config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let proxy = Arc::new(PdkProxyClient::new(config.plugin_host.clone()));
        Self::with_invoker(registry, config, proxy)
    }

    /// Create a runtime with a custom business-node invoker
    pub fn with_invoker(
        registry: Arc<NodeRegistry>,
        config: RuntimeConfig,
        invoker: Arc<dyn PluginInvoker>,
    ) -> Self {
        let resolver = ProcessorResolver::new(registry.clone());
        let executor = Arc::new(WorkflowExecutor::new(
            config.max_parallel_nodes,
            resolver,
            invoker,
        ));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor,
            event_bus,
            config,
        }
    }

    /// Get access to the core processor registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Execute a workflow to completion
    pub async fn execute(
        &self,
        workflow: &Workflow,
        input: Payload,
    ) -> Result<RunOutcome, WorkflowError> {
        self.execute_with_cancel(workflow, input, CancellationToken::new())
            .await
    }

    /// Execute a workflow that can be stopped through `cancel`
    pub async fn execute_with_cancel(
        &self,
        workflow: &Workflow,
        input: Payload,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        self.executor
            .execute(workflow, &self.event_bus, input, cancel)
            .await
    }

    /// Check a workflow without running it: graph structure, the binding of
    /// every node, and the configuration of core nodes.
    pub fn validate(&self, workflow: &Workflow) -> Result<ValidationReport, WorkflowError> {
        let plan = ExecutionPlan::build(workflow)?;
        let resolver = self.executor.resolver();

        let nodes = plan
            .order()
            .iter()
            .filter_map(|id| workflow.find_node(id))
            .map(|node| {
                let checked = resolver.resolve(node).and_then(|resolved| {
                    if let ResolvedProcessor::Core { processor, .. } = &resolved {
                        processor.validate_config(&node.config)?;
                    }
                    Ok(resolved.binding())
                });
                match checked {
                    Ok(binding) => NodeCheck {
                        node_id: node.node_id.clone(),
                        binding: Some(binding),
                        error: None,
                    },
                    Err(e) => NodeCheck {
                        node_id: node.node_id.clone(),
                        binding: None,
                        error: Some(CheckError::from(&e)),
                    },
                }
            })
            .collect();

        Ok(ValidationReport {
            order: plan.order().to_vec(),
            nodes,
        })
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Result of a dry-run check, in execution order
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub order: Vec<NodeId>,
    pub nodes: Vec<NodeCheck>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.nodes.iter().all(|n| n.error.is_none())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeCheck {
    pub node_id: NodeId,
    pub binding: Option<ProcessorBinding>,
    pub error: Option<CheckError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&NodeError> for CheckError {
    fn from(e: &NodeError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}
