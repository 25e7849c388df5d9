//! The mutable, control-owned graph.
//!
//! A [`Graph`] is what instructions edit. It is plain data: nodes keyed by id
//! (iterated in ascending id order) plus the list of active roots. Nothing in
//! it is shared with the audio context; [`commit`](super::GraphStore::commit)
//! compiles it into a separate [`RenderGraph`](super::RenderGraph).

use std::collections::{BTreeMap, BTreeSet};

use super::node::{GraphNode, NodeId};

/// Pending graph: nodes plus active roots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: BTreeMap<NodeId, GraphNode>,
    roots: Vec<NodeId>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    /// Returns true if the node exists.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Node ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Active roots, in activation order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every existing node upstream of (and including) an active root.
    pub fn reachable(&self) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.roots.clone();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if seen.insert(id) {
                stack.extend(node.upstream());
            }
        }
        seen
    }

    pub(crate) fn insert(&mut self, node: GraphNode) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<GraphNode> {
        let removed = self.nodes.remove(&id);
        if removed.is_some() {
            self.roots.retain(|&root| root != id);
        }
        removed
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn set_roots(&mut self, roots: Vec<NodeId>) {
        self.roots = roots;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;

    fn chain() -> Graph {
        // 1 -> 2 -> 3 (root), 4 isolated
        let mut graph = Graph::new();
        for id in 1..=4 {
            graph.insert(GraphNode::new(NodeId::new(id), "passthrough"));
        }
        graph
            .node_mut(NodeId::new(2))
            .unwrap()
            .inputs
            .push(Edge::new(NodeId::new(1), 0));
        graph
            .node_mut(NodeId::new(3))
            .unwrap()
            .inputs
            .push(Edge::new(NodeId::new(2), 0));
        graph.set_roots(vec![NodeId::new(3)]);
        graph
    }

    #[test]
    fn reachable_follows_upstream_edges() {
        let graph = chain();
        let reachable: Vec<_> = graph.reachable().into_iter().map(NodeId::raw).collect();
        assert_eq!(reachable, vec![1, 2, 3]);
    }

    #[test]
    fn removing_a_root_deactivates_it() {
        let mut graph = chain();
        assert!(graph.remove(NodeId::new(3)).is_some());
        assert!(graph.roots().is_empty());
        assert!(graph.reachable().is_empty());
        assert!(graph.remove(NodeId::new(3)).is_none());
    }
}
