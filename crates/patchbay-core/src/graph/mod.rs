//! Dataflow graph: pending edits, compilation, and live snapshots.
//!
//! # Architecture
//!
//! The graph uses a **two-object split**:
//!
//! - [`Graph`]: owned by the control context inside a [`GraphStore`]. Holds
//!   nodes, edges, and active roots and takes every mutation. Never touched by
//!   the audio context.
//! - [`RenderGraph`]: immutable snapshot built by
//!   [`GraphStore::commit`]. Holds a flat list of [`RenderStep`]s in evaluation
//!   order plus preallocated scratch buffers. Shared with the audio context
//!   through an `ArcSwap`, so a block renders either the old snapshot or the
//!   new one, never a mix.
//!
//! # Evaluation order
//!
//! Only nodes upstream of an active root are evaluated. They are sorted with
//! Kahn's algorithm; among nodes that are ready at the same time the lowest
//! id goes first, so the order is a pure function of the graph. Edges into a
//! delay element (such as `delay1b`) are left out of the sort, which is what
//! allows feedback through one.
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::graph::{GraphStore, NodeId};
//! use patchbay_core::processor::{ProcessorRegistry, ProcessorSetup};
//! use patchbay_core::resource::ResourceRegistry;
//! use patchbay_core::value::Value;
//!
//! let kinds = ProcessorRegistry::new();
//! let resources = ResourceRegistry::new();
//! let mut store = GraphStore::new(ProcessorSetup { sample_rate: 48000.0, block_size: 64 });
//!
//! let tone = store.create_node(Some(NodeId::new(1)), "const", &kinds)?;
//! let out = store.create_node(Some(NodeId::new(2)), "root", &kinds)?;
//! store.set_property(tone, "value", Value::from(0.5), &kinds)?;
//! store.append_child(out, tone, 0, &kinds)?;
//! store.activate_roots(&[out])?;
//! let generation = store.commit(&kinds, &resources)?;
//!
//! assert_eq!(store.live().generation(), generation);
//! # Ok::<(), patchbay_core::EngineError>(())
//! ```

mod compile;
pub mod edge;
pub mod node;
pub mod pending;
mod render;
pub mod schedule;
pub mod store;

pub use edge::Edge;
pub use node::{GraphNode, NodeId};
pub use pending::Graph;
pub use schedule::{RenderGraph, RenderStep, RootTap, SharedProcessor};
pub use store::GraphStore;
