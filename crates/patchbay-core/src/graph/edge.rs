//! Graph edge types.
//!
//! An [`Edge`] records that a node reads one output channel of an upstream
//! node. Edges are stored on the reading node, in input order.

use super::node::NodeId;

/// A directed connection from an upstream node's output into a reading node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Upstream node.
    pub source: NodeId,
    /// Which output channel of the upstream node is read.
    pub output: usize,
}

impl Edge {
    /// Creates an edge reading `output` of `source`.
    pub fn new(source: NodeId, output: usize) -> Self {
        Self { source, output }
    }
}
