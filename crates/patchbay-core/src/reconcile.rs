//! Turning declarative node trees into instruction batches.
//!
//! A [`Reconciler`] remembers which nodes it has already mounted. Given the
//! roots of a tree it walks breadth-first from the roots and emits:
//!
//! - create-node and append-child for every node not yet mounted;
//! - set-property for every parameter the engine does not already hold;
//! - activate-roots for the given roots, then commit.
//!
//! The batch is ordered by opcode, so every node exists before any edge or
//! parameter refers to it.
//!
//! A [`Directive`] pairs a tree with resources to register first; see
//! [`Engine::render`](crate::Engine::render).

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::graph::{Graph, NodeId};
use crate::protocol::Instruction;
use crate::tree::NodeRepr;
use crate::value::Object;

/// Planar sample data to register as a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    /// Channel regions of `frames` samples, concatenated.
    pub data: Vec<f32>,
    /// Channel count.
    pub channels: usize,
    /// Frames per channel.
    pub frames: usize,
}

impl AudioBuffer {
    /// A silent buffer.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            frames,
        }
    }
}

/// A tree to render and the resources it needs.
#[derive(Debug, Clone, Default)]
pub struct Directive {
    /// Roots of the tree, in output order. `None` leaves the graph alone.
    pub graph: Option<Vec<NodeRepr>>,
    /// Resources registered before the tree is applied, in name order.
    pub resources: Option<BTreeMap<String, AudioBuffer>>,
}

impl Directive {
    /// A directive rendering `roots`.
    pub fn graph(roots: Vec<NodeRepr>) -> Self {
        Self {
            graph: Some(roots),
            resources: None,
        }
    }

    /// Adds a resource to register before the tree.
    #[must_use]
    pub fn with_resource(mut self, name: impl Into<String>, buffer: AudioBuffer) -> Self {
        self.resources
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), buffer);
        self
    }

    /// The full batch: resource registrations, then the reconciled tree.
    pub(crate) fn into_batch(self, reconciler: &mut Reconciler) -> Vec<Instruction> {
        let mut batch: Vec<Instruction> = self
            .resources
            .into_iter()
            .flatten()
            .map(|(name, buffer)| Instruction::RegisterResource {
                name,
                channels: buffer.channels,
                frames: buffer.frames,
                data: buffer.data,
            })
            .collect();
        if let Some(roots) = &self.graph {
            batch.extend(reconciler.reconcile(roots));
        }
        batch
    }
}

/// Tracks mounted nodes and diffs trees against them.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    mounted: BTreeMap<NodeId, Object>,
}

impl Reconciler {
    /// A reconciler with nothing mounted.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reconciler that treats every node of `graph` as mounted with the
    /// parameters it holds.
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            mounted: graph
                .nodes()
                .map(|node| (node.id, node.props.clone()))
                .collect(),
        }
    }

    /// Returns true if `id` has been mounted.
    pub fn is_mounted(&self, id: NodeId) -> bool {
        self.mounted.contains_key(&id)
    }

    /// Number of mounted nodes.
    pub fn len(&self) -> usize {
        self.mounted.len()
    }

    /// Returns true if nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.mounted.is_empty()
    }

    /// Forgets nodes the engine no longer has, e.g. after garbage collection.
    pub fn forget(&mut self, ids: &[NodeId]) {
        for id in ids {
            self.mounted.remove(id);
        }
    }

    /// Emits the batch that makes the engine render `roots`.
    pub fn reconcile(&mut self, roots: &[NodeRepr]) -> Vec<Instruction> {
        let mut batch = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<&NodeRepr> = roots.iter().collect();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.id) {
                continue;
            }

            let held = self.mounted.entry(node.id).or_insert_with(|| {
                batch.push(Instruction::CreateNode {
                    id: Some(node.id),
                    kind: node.kind.clone(),
                });
                for child in &node.children {
                    batch.push(Instruction::AppendChild {
                        parent: node.id,
                        child: child.id,
                        output: child.output,
                    });
                }
                Object::new()
            });

            for (name, value) in &node.props {
                if held.get(name) != Some(value) {
                    batch.push(Instruction::SetProperty {
                        id: node.id,
                        name: name.clone(),
                        value: value.clone(),
                    });
                    held.insert(name.clone(), value.clone());
                }
            }

            queue.extend(&node.children);
        }

        batch.push(Instruction::ActivateRoots {
            roots: roots.iter().map(|root| root.id).collect(),
        });
        batch.push(Instruction::Commit);

        // Stable: creates land before appends, appends before properties.
        batch.sort_by_key(Instruction::opcode);
        batch
    }
}
