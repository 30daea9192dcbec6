//! Join dependency graph and its emission order.
//!
//! Nodes are join paths; an edge `a -> b` means join `a` reads something
//! from join `b` (in its ON condition or its own filters), so `b` must be
//! emitted first.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;

use crate::model::ActiveJoin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinNode {
    pub path: Vec<String>,
    /// The join's own usage has been pulled into the expansion.
    pub checked: bool,
    pub on_references_children: bool,
}

#[derive(Debug, Default)]
pub struct JoinGraph {
    graph: DiGraph<JoinNode, ()>,
    node_indices: HashMap<Vec<String>, NodeIndex>,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the node for `path`, creating it on first sight.
    pub fn node(&mut self, path: &[String]) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(JoinNode {
            path: path.to_vec(),
            checked: false,
            on_references_children: false,
        });
        self.node_indices.insert(path.to_vec(), idx);
        idx
    }

    /// Record that `join` needs `depends_on` to be joined first.
    pub fn add_dependency(&mut self, join: NodeIndex, depends_on: NodeIndex) {
        self.graph.update_edge(join, depends_on, ());
    }

    /// Mark the node checked; returns false if it already was.
    pub fn check(&mut self, idx: NodeIndex) -> bool {
        let node = &mut self.graph[idx];
        !std::mem::replace(&mut node.checked, true)
    }

    pub fn set_on_references_children(&mut self, idx: NodeIndex) {
        self.graph[idx].on_references_children = true;
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Depth-first post-order over every node, in creation order.
    ///
    /// Dependencies come before their dependents. A node reached again
    /// while still on the DFS stack is skipped, so a cyclic model yields
    /// some order instead of an error.
    pub fn active_joins(&self) -> Vec<ActiveJoin> {
        let mut sorted = Vec::with_capacity(self.graph.node_count());
        let mut dfs = DfsPostOrder::empty(&self.graph);
        for root in self.graph.node_indices() {
            dfs.move_to(root);
            while let Some(idx) = dfs.next(&self.graph) {
                let node = &self.graph[idx];
                sorted.push(ActiveJoin {
                    path: node.path.clone(),
                    on_references_children: node.on_references_children,
                });
            }
        }
        sorted
    }
}
