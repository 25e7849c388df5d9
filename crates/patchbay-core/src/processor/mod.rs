//! Node processors and the kind registry.
//!
//! Every node kind is backed by a [`NodeProcessor`] created from a
//! [`ProcessorRegistry`] factory. The registry also carries each kind's
//! [`KindDescriptor`]: output count, typed parameter expectations, the
//! parameter naming a resource, and whether the kind is a delay element.
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::processor::{KindCategory, ProcessorRegistry};
//!
//! let registry = ProcessorRegistry::new();
//! for kind in registry.all_kinds() {
//!     println!("{}: {}", kind.id, kind.description);
//! }
//! assert!(registry.descriptor("phasor").is_some());
//! assert!(registry.kinds_in_category(KindCategory::Source).count() > 0);
//! ```

mod builtin;

use thiserror::Error;

use crate::buffer::{Inputs, MAX_CHANNELS, Outputs};
use crate::error::EngineError;
use crate::event::{AudioEvent, EventChannel};
use crate::graph::NodeId;
use crate::resource::ResourceEntry;
use crate::value::{Object, Value, ValueError, ValueKind};

pub use builtin::{
    Add, BlockDelay, Constant, InputTap, Meter, Mul, Passthrough, Phasor, Root, Sample, Sine,
};

/// Failure reported by a processor; the node renders silence for the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProcessFault(pub &'static str);

/// Per-node rendering capability.
///
/// `process` runs on the audio context: it must not allocate, block, or
/// panic. Parameters are read from [`ProcessContext::props`], which is the
/// committed snapshot's copy and never changes while the snapshot is live.
pub trait NodeProcessor: Send {
    /// Renders one block into `ctx.outputs`.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault>;

    /// Called after every node of the block has rendered, with this node's
    /// inputs as they ended up. Only invoked for delay-element kinds.
    fn capture(&mut self, _inputs: &Inputs<'_>) {}

    /// Clears internal state.
    fn reset(&mut self) {}
}

/// Construction parameters handed to a processor factory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorSetup {
    /// Engine sample rate in Hz.
    pub sample_rate: f64,
    /// Largest block the processor will be asked to render.
    pub block_size: usize,
}

/// External audio input for the current block.
#[derive(Debug, Clone, Copy)]
pub struct ExternalInput<'a> {
    channels: &'a [&'a [f32]],
    offset: usize,
    frames: usize,
}

impl<'a> ExternalInput<'a> {
    /// Wraps caller-supplied input channels, starting at `offset`.
    pub fn new(channels: &'a [&'a [f32]], offset: usize, frames: usize) -> Self {
        Self {
            channels,
            offset,
            frames,
        }
    }

    /// No external input.
    pub fn none() -> Self {
        Self {
            channels: &[],
            offset: 0,
            frames: 0,
        }
    }

    /// Returns input channel `index` for this block, if supplied and long enough.
    pub fn channel(&self, index: usize) -> Option<&'a [f32]> {
        self.channels
            .get(index)?
            .get(self.offset..self.offset + self.frames)
    }

    /// Number of supplied channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Everything a processor sees while rendering one block.
pub struct ProcessContext<'a> {
    /// The node being rendered.
    pub node: NodeId,
    /// The node's committed parameters.
    pub props: &'a Object,
    /// Upstream signals, in input order.
    pub inputs: Inputs<'a>,
    /// The node's own output channels.
    pub outputs: Outputs<'a>,
    /// Resource resolved at commit, if the kind names one.
    pub resource: Option<&'a ResourceEntry>,
    /// External audio input.
    pub external: ExternalInput<'a>,
    /// Engine sample rate in Hz.
    pub sample_rate: f64,
    events: &'a EventChannel<AudioEvent>,
}

impl<'a> ProcessContext<'a> {
    /// Assembles a context. Used by the renderer and by processor tests.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: NodeId,
        props: &'a Object,
        inputs: Inputs<'a>,
        outputs: Outputs<'a>,
        resource: Option<&'a ResourceEntry>,
        external: ExternalInput<'a>,
        sample_rate: f64,
        events: &'a EventChannel<AudioEvent>,
    ) -> Self {
        Self {
            node,
            props,
            inputs,
            outputs,
            resource,
            external,
            sample_rate,
            events,
        }
    }

    /// Frames in this block.
    #[inline]
    pub fn frames(&self) -> usize {
        self.outputs.frames()
    }

    /// Reads a numeric parameter. Booleans read as 0 or 1; anything else
    /// falls back to `default`.
    #[inline]
    pub fn param(&self, name: &str, default: f64) -> f64 {
        match self.props.get(name) {
            Some(Value::Number(n)) => *n,
            Some(Value::Boolean(b)) => f64::from(u8::from(*b)),
            _ => default,
        }
    }

    /// Reads a boolean parameter. Numbers read as `!= 0`.
    #[inline]
    pub fn flag(&self, name: &str, default: bool) -> bool {
        match self.props.get(name) {
            Some(Value::Boolean(b)) => *b,
            Some(Value::Number(n)) => *n != 0.0,
            _ => default,
        }
    }

    /// Queues an event for the control context. Dropped if the queue is full.
    #[inline]
    pub fn emit(&self, event: AudioEvent) {
        self.events.push(event);
    }

    /// Gives the output channels back once rendering is done.
    pub fn into_outputs(self) -> Outputs<'a> {
        self.outputs
    }
}

/// Declared expectation for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: &'static str,
    /// Required value kind.
    pub kind: ValueKind,
    /// The value is a channel index and must stay below [`MAX_CHANNELS`].
    pub channel: bool,
}

impl ParamSpec {
    /// A parameter of the given kind.
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            channel: false,
        }
    }

    /// A Number parameter holding a channel index.
    pub const fn channel(name: &'static str) -> Self {
        Self {
            name,
            kind: ValueKind::Number,
            channel: true,
        }
    }
}

/// Category of node kind for listing and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindCategory {
    /// Produces a signal without needing inputs.
    Source,
    /// Combines or transforms signals sample by sample.
    Math,
    /// Moves signals around the graph.
    Routing,
    /// Observes signals and reports events.
    Analysis,
}

impl KindCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            KindCategory::Source => "Source",
            KindCategory::Math => "Math",
            KindCategory::Routing => "Routing",
            KindCategory::Analysis => "Analysis",
        }
    }
}

/// Describes a node kind in the registry.
#[derive(Debug, Clone)]
pub struct KindDescriptor {
    /// Kind tag used on the wire.
    pub id: &'static str,
    /// Brief description.
    pub description: &'static str,
    /// Category for organization.
    pub category: KindCategory,
    /// Number of output channels.
    pub outputs: usize,
    /// Declared parameters. Undeclared parameters are accepted as-is.
    pub params: &'static [ParamSpec],
    /// Parameter whose String value names a resource.
    pub resource_key: Option<&'static str>,
    /// Incoming edges do not order evaluation, so cycles may pass through.
    pub delay: bool,
}

impl KindDescriptor {
    /// Looks up a declared parameter.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Checks a parameter value against the declared expectation.
    pub fn validate_param(&self, node: NodeId, name: &str, value: &Value) -> Result<(), EngineError> {
        let Some(spec) = self.param(name) else {
            return Ok(());
        };
        if value.kind() != spec.kind {
            return Err(EngineError::InvalidParameter {
                node,
                kind: self.id.to_string(),
                param: name.to_string(),
                source: ValueError::TypeMismatch {
                    expected: spec.kind,
                    found: value.kind(),
                },
            });
        }
        if spec.channel
            && let Value::Number(n) = value
        {
            if *n < 0.0 {
                return Err(EngineError::NegativeChannel {
                    node,
                    param: name.to_string(),
                    value: *n,
                });
            }
            if *n >= MAX_CHANNELS as f64 {
                return Err(EngineError::capacity(
                    "channel index",
                    *n as usize,
                    MAX_CHANNELS - 1,
                ));
            }
        }
        Ok(())
    }
}

/// Factory function type for creating processors.
pub type ProcessorFactory = fn(&ProcessorSetup) -> Box<dyn NodeProcessor>;

struct RegistryEntry {
    descriptor: KindDescriptor,
    factory: ProcessorFactory,
}

/// Registry of node kinds.
///
/// [`ProcessorRegistry::new`] registers the built-in kinds; custom kinds are
/// added with [`register`](Self::register).
pub struct ProcessorRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorRegistry {
    /// Creates a registry with every built-in kind registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        builtin::register_builtin_kinds(&mut registry);
        registry
    }

    /// Creates a registry with no kinds.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers a kind, replacing any existing kind with the same id.
    pub fn register(&mut self, descriptor: KindDescriptor, factory: ProcessorFactory) {
        let entry = RegistryEntry {
            descriptor,
            factory,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.id == entry.descriptor.id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Looks up a kind's descriptor.
    pub fn descriptor(&self, id: &str) -> Option<&KindDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| &e.descriptor)
    }

    /// Creates a processor for the given kind.
    pub fn create(&self, id: &str, setup: &ProcessorSetup) -> Option<Box<dyn NodeProcessor>> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| (e.factory)(setup))
    }

    /// All registered kinds, in registration order.
    pub fn all_kinds(&self) -> impl Iterator<Item = &KindDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Registered kinds in one category.
    pub fn kinds_in_category(&self, category: KindCategory) -> impl Iterator<Item = &KindDescriptor> {
        self.all_kinds().filter(move |d| d.category == category)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
