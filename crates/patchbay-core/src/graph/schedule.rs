//! Committed render snapshots.
//!
//! A [`RenderGraph`] is an immutable snapshot produced by
//! [`GraphStore::commit`](super::GraphStore::commit). It holds a flat list of
//! [`RenderStep`]s in evaluation order, the root taps feeding the output, and
//! a scratch buffer pool preallocated for the engine's block size.
//!
//! The snapshot is shared with the audio context through an `ArcSwap`; the
//! audio context never sees partial state. Mutable processor state sits
//! behind a per-node mutex that survives across snapshots, so a node keeps
//! its phase when the graph is re-committed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BlockBuffers;
use crate::processor::NodeProcessor;
use crate::resource::ResourceEntry;
use crate::value::Object;

use super::node::NodeId;

/// Processor instance shared between the store and every snapshot using it.
pub type SharedProcessor = Arc<Mutex<Box<dyn NodeProcessor>>>;

/// One node evaluation in a committed snapshot.
pub struct RenderStep {
    pub(crate) id: NodeId,
    pub(crate) kind: String,
    /// Parameters copied at commit.
    pub(crate) props: Object,
    /// Buffer units read, in input order.
    pub(crate) inputs: Vec<usize>,
    /// First buffer unit written.
    pub(crate) first_unit: usize,
    /// Number of output units written.
    pub(crate) outputs: usize,
    pub(crate) resource: Option<Arc<ResourceEntry>>,
    pub(crate) processor: SharedProcessor,
    pub(crate) delay: bool,
}

impl RenderStep {
    /// Node rendered by this step.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Kind tag of the node.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Parameters as committed.
    pub fn props(&self) -> &Object {
        &self.props
    }

    /// Resource cached at commit.
    pub fn resource(&self) -> Option<&Arc<ResourceEntry>> {
        self.resource.as_ref()
    }
}

/// An active root summed into one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootTap {
    pub(crate) node: NodeId,
    pub(crate) unit: usize,
    pub(crate) channel: usize,
}

impl RootTap {
    /// Root node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Output channel it is summed into.
    pub fn channel(&self) -> usize {
        self.channel
    }
}

/// Immutable committed snapshot of the graph.
pub struct RenderGraph {
    pub(crate) generation: u64,
    pub(crate) steps: Vec<RenderStep>,
    pub(crate) taps: Vec<RootTap>,
    /// Indices into `steps` of delay elements, captured after each block.
    pub(crate) delays: Vec<usize>,
    pub(crate) buffers: Mutex<BlockBuffers>,
    pub(crate) units: usize,
    pub(crate) sample_rate: f64,
    pub(crate) block_size: usize,
}

impl RenderGraph {
    /// An empty snapshot that renders silence.
    pub fn empty(generation: u64, sample_rate: f64, block_size: usize) -> Self {
        Self {
            generation,
            steps: Vec::new(),
            taps: Vec::new(),
            delays: Vec::new(),
            buffers: Mutex::new(BlockBuffers::new(0, block_size)),
            units: 0,
            sample_rate,
            block_size,
        }
    }

    /// Commit generation that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Node ids in evaluation order.
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.steps.iter().map(|step| step.id)
    }

    /// Evaluation steps.
    pub fn steps(&self) -> &[RenderStep] {
        &self.steps
    }

    /// Looks up the step rendering `id`.
    pub fn step(&self, id: NodeId) -> Option<&RenderStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Returns true if the node is evaluated by this snapshot.
    pub fn contains(&self, id: NodeId) -> bool {
        self.step(id).is_some()
    }

    /// Root taps in activation order.
    pub fn taps(&self) -> &[RootTap] {
        &self.taps
    }

    /// Number of evaluated nodes.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the snapshot renders silence.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of scratch buffer units.
    pub fn unit_count(&self) -> usize {
        self.units
    }

    /// Largest sub-block rendered at once.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("generation", &self.generation)
            .field("order", &self.order().collect::<Vec<_>>())
            .field("taps", &self.taps)
            .finish_non_exhaustive()
    }
}
