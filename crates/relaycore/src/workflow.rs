use crate::{Config, Payload};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkflowId = String;
pub type NodeId = String;

/// Complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "new_workflow_id")]
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: WorkflowSettings,
}

fn new_workflow_id() -> WorkflowId {
    Uuid::new_v4().to_string()
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_workflow_id(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.node_id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.node_id == id)
    }
}

/// Node entry of a workflow definition.
///
/// A node carrying a `plugin` binding is business-tier and is always
/// dispatched to the plugin host, whatever its `node_type` says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub node_type: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginBinding>,
}

impl NodeSpec {
    pub fn new(node_id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            name: None,
            node_type: node_type.into(),
            config: Config::new(),
            plugin: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_plugin(
        mut self,
        plugin_id: impl Into<String>,
        remote_node_id: impl Into<String>,
    ) -> Self {
        self.plugin = Some(PluginBinding {
            plugin_id: plugin_id.into(),
            node_id: remote_node_id.into(),
            max_retries: None,
        });
        self
    }

    /// Override the timeout retry budget of a business node. Zero disables
    /// retries, for nodes that are not safe to re-invoke.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        if let Some(plugin) = self.plugin.as_mut() {
            plugin.max_retries = Some(max_retries);
        }
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.node_id)
    }
}

/// Where a business node lives on the plugin host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginBinding {
    pub plugin_id: String,
    /// Node id on the plugin host, not in the workflow.
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// Dependency edge, written as an ordered `[from, to]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(NodeId, NodeId)", into = "(NodeId, NodeId)")]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

impl From<(NodeId, NodeId)> for Edge {
    fn from((from, to): (NodeId, NodeId)) -> Self {
        Self { from, to }
    }
}

impl From<Edge> for (NodeId, NodeId) {
    fn from(edge: Edge) -> Self {
        (edge.from, edge.to)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Caps the worker pool below the runtime-wide bound for this workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_nodes: Option<usize>,
}
