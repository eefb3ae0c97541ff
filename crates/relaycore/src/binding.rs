use serde::{Deserialize, Serialize};
use std::fmt;

/// The tier and implementation a node was resolved to for one run.
///
/// There is no shared interface between the two variants: a core binding
/// names an in-process processor, a business binding names a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum ProcessorBinding {
    Core {
        processor: String,
    },
    Business {
        plugin_id: String,
        remote_node_id: String,
    },
}

impl ProcessorBinding {
    pub fn is_core(&self) -> bool {
        matches!(self, ProcessorBinding::Core { .. })
    }

    pub fn is_business(&self) -> bool {
        matches!(self, ProcessorBinding::Business { .. })
    }
}

impl fmt::Display for ProcessorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorBinding::Core { processor } => write!(f, "core:{}", processor),
            ProcessorBinding::Business {
                plugin_id,
                remote_node_id,
            } => write!(f, "business:{}/{}", plugin_id, remote_node_id),
        }
    }
}
