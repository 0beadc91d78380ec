//! Dependency graph construction and cycle detection.
//!
//! Tasks and workflows both depend on workflows. Nodes are keyed by `id`, and
//! an edge runs from a node to each of its dependencies. Only nodes reachable
//! from the starting node enter the graph, so an unrelated cycle elsewhere
//! never rejects a valid entity.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::workflow::Workflow;

/// Id-keyed directed graph of everything reachable from one root.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl DependencyGraph {
    fn with_root(root_id: &str) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(root_id.to_string());
        let index = HashMap::from([(root_id.to_string(), root)]);
        Self { graph, index, root }
    }

    /// Returns the node for `id` and whether it was newly added.
    fn node(&mut self, id: &str) -> (NodeIndex, bool) {
        if let Some(&idx) = self.index.get(id) {
            return (idx, false);
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        (idx, true)
    }

    /// Walk the workflow dependencies of the node `root_id`.
    pub fn from_root(root_id: &str, dependencies: &[Arc<Workflow>]) -> Self {
        let mut dag = Self::with_root(root_id);
        let root = dag.root;
        let mut stack: Vec<(NodeIndex, &Arc<Workflow>)> =
            dependencies.iter().map(|dep| (root, dep)).collect();

        while let Some((from, workflow)) = stack.pop() {
            let (to, fresh) = dag.node(workflow.id());
            dag.graph.update_edge(from, to, ());
            if fresh {
                stack.extend(workflow.dependencies().iter().map(|dep| (to, dep)));
            }
        }

        dag
    }

    /// Build the graph reachable from `root_id` over plain `(from, to)` edges.
    pub fn from_edges(root_id: &str, edges: &[(&str, &str)]) -> Self {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for &(from, to) in edges {
            adjacency.entry(from).or_default().push(to);
        }

        let mut dag = Self::with_root(root_id);
        let mut stack = vec![(dag.root, root_id)];
        while let Some((from_idx, from)) = stack.pop() {
            for &to in adjacency.get(from).into_iter().flatten() {
                let (to_idx, fresh) = dag.node(to);
                dag.graph.update_edge(from_idx, to_idx, ());
                if fresh {
                    stack.push((to_idx, to));
                }
            }
        }

        dag
    }

    /// Number of nodes reachable from the root, the root included.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The id of a node on a cycle, if the graph has one.
    pub fn find_cycle(&self) -> Option<&str> {
        // toposort alone does not report self-loops as cycles.
        if let Some(edge) = self
            .graph
            .raw_edges()
            .iter()
            .find(|edge| edge.source() == edge.target())
        {
            return Some(self.graph[edge.source()].as_str());
        }

        toposort(&self.graph, None)
            .err()
            .map(|cycle| self.graph[cycle.node_id()].as_str())
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }
}

/// True iff a dependency cycle is reachable from the node `root_id`.
pub fn has_circular_dependency(root_id: &str, dependencies: &[Arc<Workflow>]) -> bool {
    DependencyGraph::from_root(root_id, dependencies).has_cycle()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_reference_is_a_cycle() {
        let dag = DependencyGraph::from_edges("A", &[("A", "A")]);
        assert!(dag.has_cycle());
        assert_eq!(dag.find_cycle(), Some("A"));
    }

    #[test]
    fn linear_chain_has_no_cycle() {
        let dag = DependencyGraph::from_edges("A", &[("A", "B"), ("B", "C")]);
        assert!(!dag.has_cycle());
        assert_eq!(dag.node_count(), 3);
    }

    #[test]
    fn diamond_has_no_cycle() {
        let dag = DependencyGraph::from_edges(
            "A",
            &[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")],
        );
        assert!(!dag.has_cycle());
        assert_eq!(dag.node_count(), 4);
    }

    #[test]
    fn three_node_loop_is_a_cycle() {
        let dag = DependencyGraph::from_edges("A", &[("A", "B"), ("B", "C"), ("C", "A")]);
        assert!(dag.has_cycle());
    }

    #[test]
    fn unreachable_cycle_is_ignored() {
        let dag = DependencyGraph::from_edges("A", &[("A", "B"), ("C", "D"), ("D", "C")]);
        assert!(!dag.has_cycle());
        assert_eq!(dag.node_count(), 2);
    }

    #[test]
    fn cycle_below_root_is_detected() {
        let dag = DependencyGraph::from_edges("A", &[("A", "B"), ("B", "C"), ("C", "B")]);
        assert!(dag.has_cycle());
    }

    #[test]
    fn isolated_root() {
        let dag = DependencyGraph::from_edges("A", &[]);
        assert!(!dag.has_cycle());
        assert_eq!(dag.node_count(), 1);
    }
}
