//! Pure DAG-readiness state machine: which nodes are ready to launch,
//! which must be skipped, which have finished — independent of how a
//! node is actually run. Kept free of any async/process concerns so the
//! conditional-edge semantics can be tested without spawning anything,
//! the same separation the retrieved `watchdag-cli`'s
//! `DagGraph`/`Scheduler` draws between graph shape and the runtime
//! that drives it.

use std::collections::HashMap;

use swarm_compose::{DependencyEdge, EdgeCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Finished(NodeOutcome),
    Skipped,
}

impl NodeState {
    fn is_decided(self) -> bool {
        matches!(self, NodeState::Finished(_) | NodeState::Skipped)
    }
}

pub struct DagGraph {
    nodes: Vec<String>,
    edges: HashMap<String, Vec<DependencyEdge>>,
    state: HashMap<String, NodeState>,
}

impl DagGraph {
    /// `nodes` is the full set of node keys participating in this DAG
    /// run; `edges` maps a node key to its `depends_on` list. Edges
    /// targeting a node outside `nodes` are ignored (validation already
    /// rejected dangling references at the compose-document level).
    pub fn new(nodes: Vec<String>, edges: HashMap<String, Vec<DependencyEdge>>) -> Self {
        let state = nodes.iter().map(|n| (n.clone(), NodeState::Pending)).collect();
        Self { nodes, edges, state }
    }

    pub fn state_of(&self, node: &str) -> NodeState {
        self.state.get(node).copied().unwrap_or(NodeState::Pending)
    }

    pub fn mark_running(&mut self, node: &str) {
        self.state.insert(node.to_string(), NodeState::Running);
    }

    pub fn mark_finished(&mut self, node: &str, outcome: NodeOutcome) {
        self.state.insert(node.to_string(), NodeState::Finished(outcome));
    }

    /// `true` once every node is `Finished` or `Skipped` — the iteration
    /// is complete.
    pub fn is_quiescent(&self) -> bool {
        self.nodes.iter().all(|n| self.state_of(n).is_decided())
    }

    /// Walk every still-`Pending` node and flip it to `Skipped` if its
    /// readiness is decidable and unsatisfied. Call before `ready()` on
    /// every scheduling pass — a node's skip decision can only be made
    /// once, not re-derived, once its upstream nodes settle.
    pub fn advance(&mut self) -> Vec<String> {
        let mut newly_skipped = Vec::new();
        for node in self.nodes.clone() {
            if self.state_of(&node) != NodeState::Pending {
                continue;
            }
            if let Some(false) = self.decision(&node) {
                self.state.insert(node.clone(), NodeState::Skipped);
                newly_skipped.push(node);
            }
        }
        newly_skipped
    }

    /// Nodes that are `Pending` and whose every incoming edge is
    /// satisfied — safe to launch now.
    pub fn ready(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| self.state_of(n) == NodeState::Pending)
            .filter(|n| self.decision(n) == Some(true))
            .cloned()
            .collect()
    }

    /// `None` = not yet decidable (some upstream still pending/running);
    /// `Some(true)` = ready to launch; `Some(false)` = must be skipped.
    fn decision(&self, node: &str) -> Option<bool> {
        let edges = match self.edges.get(node) {
            None => return Some(true),
            Some(e) if e.is_empty() => return Some(true),
            Some(e) => e,
        };

        let mut all_satisfied = true;
        for edge in edges {
            match self.edge_satisfied(edge) {
                None => return None,
                Some(sat) => {
                    if !sat {
                        all_satisfied = false;
                    }
                }
            }
        }
        Some(all_satisfied)
    }

    fn edge_satisfied(&self, edge: &DependencyEdge) -> Option<bool> {
        match self.state_of(&edge.on) {
            NodeState::Pending | NodeState::Running => None,
            NodeState::Finished(NodeOutcome::Success) => Some(matches!(
                edge.condition,
                EdgeCondition::Success | EdgeCondition::Any | EdgeCondition::Always
            )),
            NodeState::Finished(NodeOutcome::Failure) => Some(matches!(
                edge.condition,
                EdgeCondition::Failure | EdgeCondition::Any | EdgeCondition::Always
            )),
            NodeState::Skipped => Some(edge.condition == EdgeCondition::Always),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(on: &str, condition: EdgeCondition) -> DependencyEdge {
        DependencyEdge {
            on: on.to_string(),
            condition,
        }
    }

    fn run_to_quiescence(mut graph: DagGraph, mut outcomes: HashMap<&str, NodeOutcome>) -> DagGraph {
        loop {
            graph.advance();
            let ready = graph.ready();
            if ready.is_empty() {
                break;
            }
            for node in ready {
                graph.mark_running(&node);
                let outcome = outcomes.remove(node.as_str()).unwrap_or(NodeOutcome::Success);
                graph.mark_finished(&node, outcome);
            }
        }
        graph
    }

    #[test]
    fn root_nodes_are_immediately_ready() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec![]);
        let graph = DagGraph::new(vec!["a".to_string()], edges);
        assert_eq!(graph.ready(), vec!["a".to_string()]);
    }

    #[test]
    fn success_edge_blocks_until_upstream_finishes() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec![]);
        edges.insert("b".to_string(), vec![edge("a", EdgeCondition::Success)]);
        let mut graph = DagGraph::new(vec!["a".to_string(), "b".to_string()], edges);

        assert_eq!(graph.ready(), vec!["a".to_string()]);
        graph.mark_running("a");
        assert!(graph.ready().is_empty());
        graph.mark_finished("a", NodeOutcome::Success);
        assert_eq!(graph.ready(), vec!["b".to_string()]);
    }

    /// A, B{depends_on: [{A, failure}]}, C{depends_on: [{A, success}]};
    /// A fails → A.failed, B.completed, C.skipped.
    #[test]
    fn failure_edge_runs_while_success_edge_skips_on_the_same_failing_upstream() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec![]);
        edges.insert("b".to_string(), vec![edge("a", EdgeCondition::Failure)]);
        edges.insert("c".to_string(), vec![edge("a", EdgeCondition::Success)]);
        let graph = DagGraph::new(vec!["a".to_string(), "b".to_string(), "c".to_string()], edges);

        let mut outcomes = HashMap::new();
        outcomes.insert("a", NodeOutcome::Failure);
        let graph = run_to_quiescence(graph, outcomes);

        assert_eq!(graph.state_of("a"), NodeState::Finished(NodeOutcome::Failure));
        assert_eq!(graph.state_of("b"), NodeState::Finished(NodeOutcome::Success));
        assert_eq!(graph.state_of("c"), NodeState::Skipped);
    }

    #[test]
    fn always_edge_runs_even_after_an_upstream_skip() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec![]);
        edges.insert("b".to_string(), vec![edge("a", EdgeCondition::Failure)]);
        edges.insert("c".to_string(), vec![edge("b", EdgeCondition::Always)]);
        let graph = DagGraph::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            edges,
        );

        // a succeeds, so b (depends on a's failure) is skipped, but c
        // depends on b with `always` and must still run.
        let outcomes = HashMap::new();
        let graph = run_to_quiescence(graph, outcomes);

        assert_eq!(graph.state_of("a"), NodeState::Finished(NodeOutcome::Success));
        assert_eq!(graph.state_of("b"), NodeState::Skipped);
        assert_eq!(graph.state_of("c"), NodeState::Finished(NodeOutcome::Success));
    }

    #[test]
    fn any_condition_is_satisfied_by_either_outcome() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec![]);
        edges.insert("b".to_string(), vec![edge("a", EdgeCondition::Any)]);
        let graph = DagGraph::new(vec!["a".to_string(), "b".to_string()], edges);

        let mut outcomes = HashMap::new();
        outcomes.insert("a", NodeOutcome::Failure);
        let graph = run_to_quiescence(graph, outcomes);

        assert_eq!(graph.state_of("b"), NodeState::Finished(NodeOutcome::Success));
    }

    #[test]
    fn is_quiescent_once_every_node_is_decided() {
        let mut edges = HashMap::new();
        edges.insert("a".to_string(), vec![]);
        let mut graph = DagGraph::new(vec!["a".to_string()], edges.clone());
        assert!(!graph.is_quiescent());
        graph.mark_running("a");
        assert!(!graph.is_quiescent());
        graph.mark_finished("a", NodeOutcome::Success);
        assert!(graph.is_quiescent());
        let _ = edges;
    }
}
