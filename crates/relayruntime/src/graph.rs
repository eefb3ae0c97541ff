use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use relaycore::{NodeId, Workflow, WorkflowError};
use std::collections::{HashMap, HashSet};

/// Validated dependency graph of a workflow with its topological order.
///
/// Building a plan is the only graph-level check; a workflow that yields a
/// plan never fails at the graph level afterwards.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    graph: DiGraph<NodeId, ()>,
    index: HashMap<NodeId, NodeIndex>,
    order: Vec<NodeId>,
}

impl ExecutionPlan {
    pub fn build(workflow: &Workflow) -> Result<Self, WorkflowError> {
        if workflow.nodes.is_empty() {
            return Err(WorkflowError::Empty);
        }

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in &workflow.nodes {
            if index.contains_key(&node.node_id) {
                return Err(WorkflowError::DuplicateNode(node.node_id.clone()));
            }
            let idx = graph.add_node(node.node_id.clone());
            index.insert(node.node_id.clone(), idx);
        }

        for edge in &workflow.edges {
            let dangling = |missing: &NodeId| WorkflowError::DanglingEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
                missing: missing.clone(),
            };
            let from = *index.get(&edge.from).ok_or_else(|| dangling(&edge.from))?;
            let to = *index.get(&edge.to).ok_or_else(|| dangling(&edge.to))?;

            // Repeated edges collapse into one dependency
            graph.update_edge(from, to, ());
        }

        let sorted = toposort(&graph, None)
            .map_err(|cycle| WorkflowError::CyclicGraph(graph[cycle.node_id()].clone()))?;
        let order = sorted.into_iter().map(|idx| graph[idx].clone()).collect();

        Ok(Self {
            graph,
            index,
            order,
        })
    }

    /// Node ids in a topological order
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Direct upstream nodes, in declaration order
    pub fn upstream(&self, node_id: &str) -> Vec<NodeId> {
        self.neighbors(node_id, Direction::Incoming)
    }

    /// Direct downstream nodes, in declaration order
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        self.neighbors(node_id, Direction::Outgoing)
    }

    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| self.upstream(id).is_empty())
            .cloned()
            .collect()
    }

    /// Every node reachable from `node_id`, excluding itself
    pub fn reachable_from(&self, node_id: &str) -> HashSet<NodeId> {
        let Some(&start) = self.index.get(node_id) else {
            return HashSet::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut reachable = HashSet::new();
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                reachable.insert(self.graph[idx].clone());
            }
        }
        reachable
    }

    fn neighbors(&self, node_id: &str, direction: Direction) -> Vec<NodeId> {
        let Some(&idx) = self.index.get(node_id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort();
        neighbors.into_iter().map(|n| self.graph[n].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycore::NodeSpec;

    fn workflow(nodes: &[&str], edges: &[(&str, &str)]) -> Workflow {
        let mut wf = Workflow::new("test");
        for id in nodes {
            wf.add_node(NodeSpec::new(*id, "debug_log"));
        }
        for (from, to) in edges {
            wf.connect(*from, *to);
        }
        wf
    }

    #[test]
    fn orders_diamond() {
        let wf = workflow(&["a", "b", "c", "d"], &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let plan = ExecutionPlan::build(&wf).unwrap();
        let pos = |id: &str| plan.order().iter().position(|n| n == id).unwrap();

        assert_eq!(pos("a"), 0);
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
        assert_eq!(plan.upstream("d"), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(plan.downstream("a"), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(plan.entry_nodes(), vec!["a".to_string()]);
    }

    #[test]
    fn rejects_cycles() {
        let wf = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        assert!(matches!(ExecutionPlan::build(&wf), Err(WorkflowError::CyclicGraph(_))));

        let self_loop = workflow(&["a"], &[("a", "a")]);
        assert!(matches!(ExecutionPlan::build(&self_loop), Err(WorkflowError::CyclicGraph(_))));
    }

    #[test]
    fn rejects_dangling_edges_and_duplicates() {
        let wf = workflow(&["a"], &[("a", "ghost")]);
        assert_eq!(
            ExecutionPlan::build(&wf).unwrap_err(),
            WorkflowError::DanglingEdge {
                from: "a".into(),
                to: "ghost".into(),
                missing: "ghost".into()
            }
        );

        let dup = workflow(&["a", "a"], &[]);
        assert_eq!(
            ExecutionPlan::build(&dup).unwrap_err(),
            WorkflowError::DuplicateNode("a".into())
        );

        assert_eq!(
            ExecutionPlan::build(&Workflow::new("empty")).unwrap_err(),
            WorkflowError::Empty
        );
    }

    #[test]
    fn repeated_edges_count_once() {
        let wf = workflow(&["a", "b"], &[("a", "b"), ("a", "b")]);
        let plan = ExecutionPlan::build(&wf).unwrap();
        assert_eq!(plan.upstream("b"), vec!["a".to_string()]);
    }

    #[test]
    fn reachability() {
        let wf = workflow(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c")]);
        let plan = ExecutionPlan::build(&wf).unwrap();
        let reach = plan.reachable_from("a");
        assert!(reach.contains("b") && reach.contains("c"));
        assert!(!reach.contains("d") && !reach.contains("a"));
    }
}
