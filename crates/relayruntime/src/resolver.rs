use crate::registry::NodeRegistry;
use relaycore::{NodeError, NodeId, NodeSpec, PluginBinding, Processor, ProcessorBinding, Workflow};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A node's processor, resolved once per run.
#[derive(Clone)]
pub enum ResolvedProcessor {
    Core {
        name: String,
        processor: Arc<dyn Processor>,
    },
    Business(PluginBinding),
}

impl ResolvedProcessor {
    pub fn binding(&self) -> ProcessorBinding {
        match self {
            ResolvedProcessor::Core { name, .. } => ProcessorBinding::Core {
                processor: name.clone(),
            },
            ResolvedProcessor::Business(plugin) => ProcessorBinding::Business {
                plugin_id: plugin.plugin_id.clone(),
                remote_node_id: plugin.node_id.clone(),
            },
        }
    }
}

impl fmt::Debug for ResolvedProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolvedProcessor({})", self.binding())
    }
}

/// Per-run table of resolutions, one entry per workflow node.
pub type BindingTable = HashMap<NodeId, Result<ResolvedProcessor, NodeError>>;

/// Decides which tier executes a node.
///
/// A plugin binding on the node always means business tier. Otherwise the
/// node type must be a registered core processor. There is no fallback in
/// either direction, and the resolver cannot reach the network.
#[derive(Clone)]
pub struct ProcessorResolver {
    registry: Arc<NodeRegistry>,
}

impl ProcessorResolver {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn resolve(&self, node: &NodeSpec) -> Result<ResolvedProcessor, NodeError> {
        if let Some(plugin) = &node.plugin {
            tracing::debug!(
                node_id = %node.node_id,
                plugin_id = %plugin.plugin_id,
                remote_node_id = %plugin.node_id,
                "Resolved to business processor"
            );
            return Ok(ResolvedProcessor::Business(plugin.clone()));
        }

        let processor = self
            .registry
            .create_processor(&node.node_type, &node.config)?;
        tracing::debug!(
            node_id = %node.node_id,
            processor = %node.node_type,
            "Resolved to core processor"
        );
        Ok(ResolvedProcessor::Core {
            name: node.node_type.clone(),
            processor: Arc::from(processor),
        })
    }

    /// Resolve every node of a workflow. Failures stay node-local.
    pub fn resolve_all(&self, workflow: &Workflow) -> BindingTable {
        workflow
            .nodes
            .iter()
            .map(|node| {
                let resolved = self.resolve(node);
                if let Err(e) = &resolved {
                    tracing::warn!(node_id = %node.node_id, "Could not resolve node: {}", e);
                }
                (node.node_id.clone(), resolved)
            })
            .collect()
    }
}
