//! Patchbay Core - a real-time audio graph runtime driven by batched instructions
//!
//! A control context describes a dataflow graph of audio nodes through
//! batches of instructions; an audio context renders the most recently
//! committed graph block by block.
//!
//! # Core Abstractions
//!
//! ## Values
//!
//! - [`Value`] - Dynamic value model shared by properties, instructions, and events
//!
//! ## Graph
//!
//! - [`GraphStore`] - Pending graph, processor state, and the published snapshot
//! - [`RenderGraph`] - Immutable compiled snapshot the audio context renders
//! - [`NodeId`] - Caller- or engine-assigned node identity
//!
//! ## Processing
//!
//! - [`NodeProcessor`] - Object-safe per-node processing trait
//! - [`ProcessorRegistry`] - Kind descriptors and processor factories
//! - [`ResourceRegistry`] - Named multi-channel sample data
//!
//! ## Engine
//!
//! - [`Engine`] - Control-side entry points: batches, resources, events
//! - [`Renderer`] - Audio-side handle rendering the live snapshot
//! - [`Instruction`] - Typed form of the batch wire encoding
//!
//! ## Trees
//!
//! - [`NodeRepr`] - Content-addressed node description built with [`tree::primitives`]
//! - [`Reconciler`] - Diffs a tree against mounted nodes into an instruction batch
//! - [`Directive`] - A tree plus resources, applied with [`Engine::render`]
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! engine.register_resource("buf", 2, 4, vec![0.0; 8])?;
//! let status = engine.apply_instructions_json(
//!     r#"[[0, 1, "sample"], [3, 1, "path", "buf"], [4, [1]], [5]]"#,
//! );
//! assert_eq!(status, 0);
//!
//! let mut planar = [1.0f32; 8];
//! engine.process_planar(&mut planar, 2, 4);
//! assert!(planar.iter().all(|&s| s == 0.0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: No allocation, blocking, or logging while rendering
//! - **Atomic commits**: A block renders the old snapshot or the new one, never a mix
//! - **Deterministic**: Evaluation order is a pure function of the graph
//! - **Explicit context**: No globals; every operation goes through an [`Engine`]

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod processor;
pub mod protocol;
pub mod reconcile;
pub mod resource;
pub mod tree;
pub mod value;

// Re-export main types at crate root
pub use buffer::{BlockBuffers, Inputs, MAX_CHANNELS, Outputs};
pub use config::EngineConfig;
pub use engine::{Engine, Renderer, STATUS_OK, STATUS_PARSE_ERROR};
pub use error::{ConfigError, EngineError, ErrorCategory, ProtocolError};
pub use event::{AudioEvent, Event, EventChannel, FaultKind};
pub use graph::{Edge, Graph, GraphNode, GraphStore, NodeId, RenderGraph};
pub use processor::{
    KindCategory, KindDescriptor, NodeProcessor, ParamSpec, ProcessContext, ProcessFault,
    ProcessorRegistry, ProcessorSetup,
};
pub use protocol::{BatchError, BatchReport, Instruction, parse_batch, parse_batch_json};
pub use reconcile::{AudioBuffer, Directive, Reconciler};
pub use resource::{ResourceEntry, ResourceRegistry};
pub use tree::{NodeRepr, create_node};
pub use value::{FromValue, Value, ValueError, ValueKind};
