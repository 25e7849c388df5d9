//! Graph node types.
//!
//! Each node in a pending graph has a [`NodeId`], a kind tag naming the
//! processor that renders it, a parameter [`Object`], and an ordered list of
//! upstream [`Edge`]s. Nodes are plain data; processor instances live beside
//! them in the [`GraphStore`](super::GraphStore).

use std::fmt;

use crate::value::Object;

use super::edge::Edge;

/// Unique identifier for a node in a graph.
///
/// Ids are chosen by the caller (the wire protocol carries them as integers)
/// or assigned by the engine. They stay stable across commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) i64);

impl NodeId {
    /// Wraps a raw identifier.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric identifier.
    #[inline]
    pub fn raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// A node of the pending graph.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    /// Node identifier.
    pub id: NodeId,
    /// Kind tag naming the processor.
    pub kind: String,
    /// Parameters, owned by the node.
    pub props: Object,
    /// Upstream connections in input order.
    pub inputs: Vec<Edge>,
}

impl GraphNode {
    /// Creates a node with no parameters and no inputs.
    pub fn new(id: NodeId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            props: Object::new(),
            inputs: Vec::new(),
        }
    }

    /// Returns the value of a String parameter, if present and a String.
    pub fn str_prop(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(|v| v.as_str().ok())
    }

    /// Iterates over the ids this node reads from.
    pub fn upstream(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().map(|edge| edge.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn node_id_orders_numerically() {
        let mut ids = vec![NodeId::new(10), NodeId::new(-3), NodeId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![NodeId::new(-3), NodeId::new(2), NodeId::new(10)]);
        assert_eq!(NodeId::new(5).to_string(), "#5");
    }

    #[test]
    fn str_prop_ignores_non_strings() {
        let mut node = GraphNode::new(NodeId::new(1), "sample");
        node.props.insert("path".into(), Value::from("kick"));
        node.props.insert("name".into(), Value::from(4.0));
        assert_eq!(node.str_prop("path"), Some("kick"));
        assert_eq!(node.str_prop("name"), None);
        assert_eq!(node.str_prop("missing"), None);
    }
}
