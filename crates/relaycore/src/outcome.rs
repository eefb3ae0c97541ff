use crate::{ExecutionId, NodeId, NodeResult, ProcessorBinding, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    PartialFailure,
    Failed,
}

impl RunStatus {
    /// Aggregate node results into a run status.
    ///
    /// All succeeded is `Completed`, none succeeded is `Failed`, anything in
    /// between is `PartialFailure`. A cancelled run is always `Failed`.
    pub fn aggregate<'a>(results: impl IntoIterator<Item = &'a NodeResult>, cancelled: bool) -> Self {
        if cancelled {
            return RunStatus::Failed;
        }

        let (mut succeeded, mut total) = (0usize, 0usize);
        for result in results {
            total += 1;
            if result.is_success() {
                succeeded += 1;
            }
        }

        if succeeded == 0 {
            RunStatus::Failed
        } else if succeeded == total {
            RunStatus::Completed
        } else {
            RunStatus::PartialFailure
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::PartialFailure => f.write_str("partial_failure"),
            RunStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Terminal state of one node as reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    /// `None` when the node could not be resolved.
    pub binding: Option<ProcessorBinding>,
    pub result: NodeResult,
    /// Set for nodes whose processor was invoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub nodes: BTreeMap<NodeId, NodeReport>,
}

impl RunOutcome {
    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.nodes.get(node_id).map(|report| &report.result)
    }

    pub fn output(&self, node_id: &str) -> Option<&serde_json::Value> {
        self.result(node_id).and_then(NodeResult::output)
    }

    pub fn succeeded(&self) -> usize {
        self.count(NodeResult::is_success)
    }

    pub fn failed(&self) -> usize {
        self.count(NodeResult::is_failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(NodeResult::is_skipped)
    }

    fn count(&self, pred: impl Fn(&NodeResult) -> bool) -> usize {
        self.nodes.values().filter(|r| pred(&r.result)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, SkipReason};
    use serde_json::json;

    fn ok() -> NodeResult {
        NodeResult::Success { output: json!(null) }
    }

    fn failed() -> NodeResult {
        NodeResult::Failed {
            kind: ErrorKind::ConnectionError,
            message: "refused".into(),
        }
    }

    fn skipped() -> NodeResult {
        NodeResult::Skipped {
            reason: SkipReason::UpstreamFailed {
                upstream: "a".into(),
            },
        }
    }

    #[test]
    fn all_succeeded_is_completed() {
        assert_eq!(RunStatus::aggregate(&[ok(), ok()], false), RunStatus::Completed);
    }

    #[test]
    fn mixed_is_partial_failure() {
        assert_eq!(
            RunStatus::aggregate(&[ok(), failed(), ok()], false),
            RunStatus::PartialFailure
        );
        assert_eq!(
            RunStatus::aggregate(&[ok(), skipped()], false),
            RunStatus::PartialFailure
        );
    }

    #[test]
    fn nothing_succeeded_is_failed() {
        assert_eq!(
            RunStatus::aggregate(&[failed(), skipped()], false),
            RunStatus::Failed
        );
    }

    #[test]
    fn cancellation_always_fails_the_run() {
        assert_eq!(RunStatus::aggregate(&[ok(), ok()], true), RunStatus::Failed);
    }
}
