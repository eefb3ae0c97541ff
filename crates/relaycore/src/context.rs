use crate::{ErrorKind, ExecutionId, NodeError, NodeId, Payload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Terminal result of one node in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeResult {
    Success { output: Payload },
    Failed { kind: ErrorKind, message: String },
    Skipped { reason: SkipReason },
}

impl NodeResult {
    pub fn failed(error: &NodeError) -> Self {
        NodeResult::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeResult::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, NodeResult::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, NodeResult::Skipped { .. })
    }

    pub fn output(&self) -> Option<&Payload> {
        match self {
            NodeResult::Success { output } => Some(output),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            NodeResult::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum SkipReason {
    /// A direct upstream node failed or was itself skipped.
    UpstreamFailed { upstream: NodeId },
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpstreamFailed { upstream } => {
                write!(f, "upstream node '{}' did not succeed", upstream)
            }
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-run data bus. Each node's result is written exactly once.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub started_at: DateTime<Utc>,
    /// Input handed to the run, fed to entry nodes.
    pub input: Payload,
    results: HashMap<NodeId, NodeResult>,
}

impl ExecutionContext {
    pub fn new(input: Payload) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            started_at: Utc::now(),
            input,
            results: HashMap::new(),
        }
    }

    /// Record the terminal result of a node. Returns `false`, leaving the
    /// first result in place, if the node already has one.
    pub fn record(&mut self, node_id: impl Into<NodeId>, result: NodeResult) -> bool {
        let node_id = node_id.into();
        if self.results.contains_key(&node_id) {
            tracing::warn!(node_id = %node_id, "Ignoring second result for node");
            return false;
        }
        self.results.insert(node_id, result);
        true
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeResult> {
        self.results.get(node_id)
    }

    pub fn output(&self, node_id: &str) -> Option<&Payload> {
        self.results.get(node_id).and_then(NodeResult::output)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.results.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> impl Iterator<Item = (&NodeId, &NodeResult)> {
        self.results.iter()
    }

    /// Build the input of a node from the outputs of its direct upstreams.
    ///
    /// An entry node gets the run input. A node with one upstream gets that
    /// upstream's output as is. A node with several gets an object keyed by
    /// upstream node id. Upstreams without a successful output are left out.
    pub fn assemble_input(&self, upstream: &[NodeId]) -> (Payload, BTreeMap<NodeId, Payload>) {
        let outputs: BTreeMap<NodeId, Payload> = upstream
            .iter()
            .filter_map(|id| self.output(id).map(|out| (id.clone(), out.clone())))
            .collect();

        let payload = match upstream.len() {
            0 => self.input.clone(),
            1 => outputs.values().next().cloned().unwrap_or(Payload::Null),
            _ => Payload::Object(
                outputs
                    .iter()
                    .map(|(id, out)| (id.clone(), out.clone()))
                    .collect(),
            ),
        };

        (payload, outputs)
    }

    pub fn into_results(self) -> HashMap<NodeId, NodeResult> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(value: Payload) -> NodeResult {
        NodeResult::Success { output: value }
    }

    #[test]
    fn results_are_written_once() {
        let mut ctx = ExecutionContext::new(Payload::Null);
        assert!(ctx.record("a", success(json!(1))));
        assert!(!ctx.record("a", success(json!(2))));
        assert_eq!(ctx.output("a"), Some(&json!(1)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn entry_node_receives_run_input() {
        let ctx = ExecutionContext::new(json!({"text": "hi"}));
        let (payload, upstream) = ctx.assemble_input(&[]);
        assert_eq!(payload, json!({"text": "hi"}));
        assert!(upstream.is_empty());
    }

    #[test]
    fn single_upstream_is_passed_through() {
        let mut ctx = ExecutionContext::new(Payload::Null);
        ctx.record("a", success(json!({"text": "hello"})));
        let (payload, _) = ctx.assemble_input(&["a".to_string()]);
        assert_eq!(payload, json!({"text": "hello"}));
    }

    #[test]
    fn several_upstreams_are_keyed_by_node_id() {
        let mut ctx = ExecutionContext::new(Payload::Null);
        ctx.record("a", success(json!("left")));
        ctx.record("b", success(json!("right")));
        let (payload, upstream) = ctx.assemble_input(&["a".to_string(), "b".to_string()]);
        assert_eq!(payload, json!({"a": "left", "b": "right"}));
        assert_eq!(upstream.len(), 2);
    }

    #[test]
    fn failed_result_carries_kind_and_message() {
        let err = NodeError::RemoteExecution("index is read-only".into());
        let result = NodeResult::failed(&err);
        assert_eq!(result.error_kind(), Some(ErrorKind::RemoteExecutionError));
        assert_eq!(
            result,
            NodeResult::Failed {
                kind: ErrorKind::RemoteExecutionError,
                message: "index is read-only".into()
            }
        );
    }
}
