//! Declarative node trees.
//!
//! A [`NodeRepr`] describes a node by its kind, parameters and children. Its
//! id is a hash of that content, so describing the same subtree twice yields
//! the same id and the [`Reconciler`](crate::reconcile::Reconciler) can tell
//! which nodes the engine already has.
//!
//! ```rust
//! use patchbay_core::tree::primitives::{constant, mul2, phasor, root, sin};
//!
//! let tone = root(sin(mul2(constant(std::f64::consts::TAU), phasor(constant(110.0)))));
//! assert_eq!(tone.kind, "root");
//! assert_eq!(tone.node_count(), 6);
//! ```

pub mod primitives;

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::graph::NodeId;
use crate::value::{Object, Value};

/// A node description with its upstream subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRepr {
    /// Content-derived id.
    pub id: NodeId,
    /// Kind tag.
    pub kind: String,
    /// Parameters.
    pub props: Object,
    /// Output of this node its parent reads.
    pub output: usize,
    /// Upstream nodes in input order.
    pub children: Vec<NodeRepr>,
}

impl NodeRepr {
    /// Selects which output of this node the parent reads.
    ///
    /// The id is unchanged: the choice belongs to the edge, and the parent's
    /// id covers it.
    #[must_use]
    pub fn with_output(mut self, output: usize) -> Self {
        self.output = output;
        self
    }

    /// Number of distinct nodes in the tree, counting shared subtrees once.
    pub fn node_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if seen.insert(node.id) {
                stack.extend(&node.children);
            }
        }
        seen.len()
    }
}

/// Builds a node, deriving its id from kind, parameters and children.
pub fn create_node(kind: &str, props: Object, children: Vec<NodeRepr>) -> NodeRepr {
    let mut hasher = DefaultHasher::new();
    kind.hash(&mut hasher);
    for (name, value) in &props {
        name.hash(&mut hasher);
        hash_value(value, &mut hasher);
    }
    for child in &children {
        child.id.hash(&mut hasher);
        child.output.hash(&mut hasher);
    }

    NodeRepr {
        // Ids stay in the 32-bit range so they never meet engine-assigned ids.
        id: NodeId::new(i64::from(hasher.finish() as i32)),
        kind: kind.to_string(),
        props,
        output: 0,
        children,
    }
}

fn hash_value(value: &Value, hasher: &mut DefaultHasher) {
    value.to_json().to_string().hash(hasher);
}

#[cfg(test)]
mod tests {
    use super::primitives::{constant, mul2, phasor, root, sin};
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Object {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn equal_content_gives_equal_ids() {
        let a = create_node("const", props(&[("value", Value::from(2.0))]), vec![]);
        let b = create_node("const", props(&[("value", Value::from(2.0))]), vec![]);
        assert_eq!(a.id, b.id);
        assert_eq!(a, b);
    }

    #[test]
    fn any_content_change_changes_the_id() {
        let base = create_node("const", props(&[("value", Value::from(2.0))]), vec![]);
        let other_value = create_node("const", props(&[("value", Value::from(3.0))]), vec![]);
        let other_kind = create_node("phasor", props(&[("value", Value::from(2.0))]), vec![]);
        assert_ne!(base.id, other_value.id);
        assert_ne!(base.id, other_kind.id);

        let one = create_node("sin", Object::new(), vec![base.clone()]);
        let two = create_node("sin", Object::new(), vec![other_value]);
        assert_ne!(one.id, two.id);

        let first = create_node("add", Object::new(), vec![base.clone()]);
        let second = create_node("add", Object::new(), vec![base.with_output(1)]);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn ids_fit_in_32_bits() {
        let node = sin(phasor(constant(440.0)));
        assert!(i32::try_from(node.id.raw()).is_ok());
    }

    #[test]
    fn shared_subtrees_count_once() {
        let freq = constant(110.0);
        let tree = root(mul2(sin(phasor(freq.clone())), phasor(freq)));
        // root, mul, sin, phasor, const: the second phasor(const 110) is the same node.
        assert_eq!(tree.node_count(), 5);
    }
}
