//! The engine: control-side entry points plus the audio-side renderer.
//!
//! [`Engine`] is an explicit context; nothing is global. Control-side
//! operations (`apply_instructions`, `register_resource`, `drain_events`,
//! housekeeping) take `&mut self` or `&self` on the owning thread. The audio
//! side renders through a [`Renderer`], a cheap clonable handle that only
//! loads the live snapshot and pushes events.
//!
//! ```rust
//! use patchbay_core::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! let status = engine.apply_instructions_json(
//!     r#"[[0, 1, "const"], [3, 1, "value", 0.25], [0, 2, "root"], [2, 2, 1], [4, [2]]]"#,
//! );
//! assert_eq!(status, 0);
//!
//! let mut left = [0.0f32; 64];
//! let mut right = [0.0f32; 64];
//! engine.process(&[], &mut [&mut left[..], &mut right[..]]);
//! assert!(left.iter().all(|&s| s == 0.25));
//! assert!(right.iter().all(|&s| s == 0.0));
//! # Ok::<(), patchbay_core::ConfigError>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::buffer::MAX_CHANNELS;
use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError};
use crate::event::{AudioEvent, Event, EventChannel};
use crate::graph::{Graph, GraphStore, NodeId, RenderGraph};
use crate::processor::ProcessorRegistry;
use crate::protocol::{self, BatchError, BatchReport, BatchTarget, Instruction};
use crate::reconcile::{Directive, Reconciler};
use crate::resource::ResourceRegistry;
use crate::value::Value;

/// Status returned when a batch cannot be parsed.
pub const STATUS_PARSE_ERROR: i32 = -1;

/// Status returned when a batch applied completely.
pub const STATUS_OK: i32 = 0;

/// Audio-side handle: renders the live snapshot.
///
/// Rendering performs one atomic load of the live snapshot per call, never
/// allocates, and never blocks; see [`RenderGraph::render`]. A call that finds
/// the snapshot's scratch buffers busy renders silence and counts a missed
/// block.
#[derive(Clone)]
pub struct Renderer {
    live: Arc<ArcSwap<RenderGraph>>,
    events: Arc<EventChannel<AudioEvent>>,
    missed: Arc<AtomicU64>,
}

impl Renderer {
    /// Renders into non-interleaved output channels with optional input
    /// channels. At most [`MAX_CHANNELS`] outputs are written; the rest are
    /// cleared.
    pub fn process(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) {
        let (used, rest) = outputs.split_at_mut(outputs.len().min(MAX_CHANNELS));
        for channel in rest.iter_mut() {
            channel.fill(0.0);
        }
        if !self.live.load().render(inputs, used, &self.events) {
            self.missed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Renders `frames` frames of `channels` channels into a planar buffer
    /// (channel regions of `frames` samples, concatenated).
    pub fn process_planar(&self, output: &mut [f32], channels: usize, frames: usize) {
        if frames == 0 {
            return;
        }
        let channels = channels.min(MAX_CHANNELS).min(output.len() / frames);
        let mut slots: [&mut [f32]; MAX_CHANNELS] = Default::default();
        for (slot, chunk) in slots.iter_mut().zip(output.chunks_mut(frames)) {
            *slot = chunk;
        }
        self.process(&[], &mut slots[..channels]);
    }

    /// Generation of the snapshot the next block will render.
    pub fn generation(&self) -> u64 {
        self.live.load().generation()
    }

    /// Calls that rendered silence because another render held the buffers.
    pub fn missed_blocks(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }
}

/// Engine context: graph store, resources, processors, and events.
pub struct Engine {
    config: EngineConfig,
    kinds: ProcessorRegistry,
    store: GraphStore,
    resources: ResourceRegistry,
    events: Arc<EventChannel<AudioEvent>>,
    renderer: Renderer,
}

impl Engine {
    /// Creates an engine with the built-in node kinds.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_registry(config, ProcessorRegistry::new())
    }

    /// Creates an engine rendering through a custom kind registry.
    pub fn with_registry(
        config: EngineConfig,
        kinds: ProcessorRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let store = GraphStore::new(config.processor_setup());
        let events = Arc::new(EventChannel::new(config.event_capacity));
        let renderer = Renderer {
            live: store.live_handle(),
            events: Arc::clone(&events),
            missed: Arc::new(AtomicU64::new(0)),
        };
        debug!(
            "engine_new: {} Hz, block {}, {} kinds",
            config.sample_rate,
            config.block_size,
            kinds.len()
        );
        Ok(Self {
            config,
            kinds,
            store,
            resources: ResourceRegistry::new(),
            events,
            renderer,
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered node kinds.
    pub fn kinds(&self) -> &ProcessorRegistry {
        &self.kinds
    }

    /// Applies a batch given as a [`Value`] and returns its status code.
    ///
    /// `0` on success, the 1-based index of the first failing instruction,
    /// `len + 1` if the end-of-batch commit failed, or `-1` if the batch could
    /// not be parsed (nothing was applied).
    pub fn apply_instructions(&mut self, batch: &Value) -> i32 {
        match protocol::parse_batch(batch) {
            Ok(instructions) => self.apply_status(&instructions),
            Err(err) => {
                warn!("batch_apply: rejected before applying, {err}");
                STATUS_PARSE_ERROR
            }
        }
    }

    /// Applies a batch given as JSON text and returns its status code.
    pub fn apply_instructions_json(&mut self, text: &str) -> i32 {
        match protocol::parse_batch_json(text) {
            Ok(instructions) => self.apply_status(&instructions),
            Err(err) => {
                warn!("batch_apply: rejected before applying, {err}");
                STATUS_PARSE_ERROR
            }
        }
    }

    fn apply_status(&mut self, instructions: &[Instruction]) -> i32 {
        match self.apply(instructions) {
            Ok(_) => STATUS_OK,
            Err(err) => err.status(),
        }
    }

    /// Applies parsed instructions in order.
    ///
    /// Stops at the first failing instruction; instructions before it stay
    /// applied. Uncommitted changes are committed at the end of a fully
    /// applied batch.
    pub fn apply(&mut self, batch: &[Instruction]) -> Result<BatchReport, BatchError> {
        self.reclaim();
        let mut target = BatchTarget {
            store: &mut self.store,
            resources: &mut self.resources,
            kinds: &self.kinds,
        };
        let result = target.apply(batch);
        if let Err(err) = &result {
            let name = batch.get(err.index - 1).map_or("end-of-batch commit", Instruction::name);
            warn!("batch_apply: {name} at {} failed: {}", err.index, err.source);
        }
        result
    }

    /// Registers the directive's resources, then applies the batch that makes
    /// the pending graph render its tree.
    ///
    /// Nodes already in the pending graph with the same content id are reused,
    /// so re-rendering a mostly unchanged tree only creates what changed and
    /// processor state carries over. Failure reporting matches [`apply`](Self::apply).
    pub fn render(&mut self, directive: Directive) -> Result<BatchReport, BatchError> {
        let mut reconciler = Reconciler::from_graph(self.store.pending());
        let batch = directive.into_batch(&mut reconciler);
        debug!("engine_render: {} instructions", batch.len());
        self.apply(&batch)
    }

    /// Compiles and publishes the pending graph. Returns the new generation.
    pub fn commit(&mut self) -> Result<u64, EngineError> {
        self.reclaim();
        self.store.commit(&self.kinds, &self.resources)
    }

    /// Registers or replaces a named resource.
    ///
    /// Nodes pick up the new data at the next commit; snapshots already
    /// published keep the entry they resolved.
    pub fn register_resource(
        &mut self,
        name: impl Into<String>,
        channels: usize,
        frames: usize,
        data: Vec<f32>,
    ) -> Result<(), EngineError> {
        self.reclaim();
        self.resources.register(name, channels, frames, data)?;
        self.store.mark_dirty();
        Ok(())
    }

    /// Removes resources no pending node references. Returns their names.
    pub fn prune_resources(&mut self) -> Vec<String> {
        let referenced = self.store.referenced_resources(&self.kinds);
        self.resources.prune(&referenced)
    }

    /// Returns every node to its initial state: phases restart and delays
    /// empty. The graph itself is unchanged.
    pub fn reset(&self) {
        self.store.reset_processors();
    }

    /// Deletes pending nodes not upstream of an active root. Returns their ids.
    pub fn collect_garbage(&mut self) -> Vec<NodeId> {
        self.store.collect_garbage()
    }

    /// Takes every queued event, converted to `{type, event}` records.
    pub fn drain_events(&self) -> Vec<Event> {
        self.events
            .drain_all()
            .into_iter()
            .map(|raw| {
                let source = self
                    .store
                    .pending()
                    .node(raw.node())
                    .and_then(|node| node.str_prop("name"));
                raw.into_event(source)
            })
            .collect()
    }

    /// Events dropped because the queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// Render calls skipped because the snapshot's buffers were busy.
    pub fn missed_blocks(&self) -> u64 {
        self.renderer.missed_blocks()
    }

    /// Renders the live snapshot. See [`Renderer::process`].
    pub fn process(&self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) {
        self.renderer.process(inputs, outputs);
    }

    /// Renders into a planar buffer. See [`Renderer::process_planar`].
    pub fn process_planar(&self, output: &mut [f32], channels: usize, frames: usize) {
        self.renderer.process_planar(output, channels, frames);
    }

    /// A handle for rendering on another thread.
    pub fn renderer(&self) -> Renderer {
        self.renderer.clone()
    }

    /// The graph instructions edit.
    pub fn pending_graph(&self) -> &Graph {
        self.store.pending()
    }

    /// The currently published snapshot.
    pub fn live_snapshot(&self) -> Arc<RenderGraph> {
        self.store.live()
    }

    /// Generation of the currently published snapshot (0 before any commit).
    pub fn live_generation(&self) -> u64 {
        self.store.live().generation()
    }

    /// Registered resources.
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Superseded snapshots and resources not yet freed.
    pub fn retired_len(&self) -> usize {
        self.store.retired_len() + self.resources.retired_len()
    }

    /// Frees superseded snapshots and resources nothing holds any more.
    pub fn reclaim(&mut self) -> usize {
        self.store.reclaim() + self.resources.reclaim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            block_size: 8,
            event_capacity: 16,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            max_channels: 64,
            ..Default::default()
        };
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn parse_error_applies_nothing() {
        let mut engine = engine();
        let status = engine.apply_instructions_json(r#"[[0, 1, "const"], [42]]"#);
        assert_eq!(status, STATUS_PARSE_ERROR);
        assert!(engine.pending_graph().is_empty());
        assert_eq!(engine.apply_instructions(&Value::from(3.0)), STATUS_PARSE_ERROR);
    }

    #[test]
    fn failing_implicit_commit_reports_len_plus_one() {
        let mut engine = engine();
        let status = engine.apply_instructions_json(
            r#"[[0, 1, "add"], [0, 2, "add"], [2, 1, 2], [2, 2, 1], [4, [1]]]"#,
        );
        assert_eq!(status, 6);
        assert_eq!(engine.live_generation(), 0);
    }

    #[test]
    fn typed_apply_reports_assigned_ids() {
        let mut engine = engine();
        let report = engine
            .apply(&[
                Instruction::CreateNode {
                    id: None,
                    kind: "const".into(),
                },
                Instruction::Commit,
            ])
            .unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.assigned.len(), 1);
        assert_eq!(report.commits, vec![1]);
    }

    #[test]
    fn sub_blocks_cover_long_requests() {
        let mut engine = engine();
        assert_eq!(
            engine.apply_instructions_json(
                r#"[[0, 1, "const"], [3, 1, "value", 1.0], [0, 2, "root"], [2, 2, 1], [4, [2]]]"#,
            ),
            0
        );
        // 8-frame sub-blocks, 20-frame request.
        let mut out = vec![0.0f32; 20];
        engine.process(&[], &mut [&mut out[..]]);
        assert!(out.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn busy_buffers_count_a_missed_block() {
        let mut engine = engine();
        engine.apply_instructions_json(
            r#"[[0, 1, "const"], [3, 1, "value", 1.0], [0, 2, "root"], [2, 2, 1], [4, [2]]]"#,
        );
        let snapshot = engine.live_snapshot();
        let mut out = vec![7.0f32; 8];
        {
            let _held = snapshot.buffers.lock();
            engine.process(&[], &mut [&mut out[..]]);
        }
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.missed_blocks(), 1);

        engine.process(&[], &mut [&mut out[..]]);
        assert!(out.iter().all(|&s| s == 1.0));
        assert_eq!(engine.missed_blocks(), 1);
    }

    #[test]
    fn process_planar_fills_channel_regions() {
        let mut engine = engine();
        engine.apply_instructions_json(
            r#"[[0, 1, "const"], [3, 1, "value", 0.5],
                [0, 2, "root"], [3, 2, "channel", 1], [2, 2, 1], [4, [2]]]"#,
        );
        let mut planar = vec![9.0f32; 8];
        engine.process_planar(&mut planar, 2, 4);
        assert_eq!(planar, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn meter_events_carry_name() {
        let mut engine = engine();
        engine.apply_instructions_json(
            r#"[[0, 1, "const"], [3, 1, "value", 0.5],
                [0, 2, "meter"], [3, 2, "name", "out"], [2, 2, 1],
                [0, 3, "root"], [2, 3, 2], [4, [3]]]"#,
        );
        let mut out = vec![0.0f32; 8];
        engine.process(&[], &mut [&mut out[..]]);
        let events = engine.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "meter");
        assert_eq!(events[0].event.get("source"), Some(&Value::from("out")));
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn input_node_reads_external_audio() {
        let mut engine = engine();
        engine.apply_instructions_json(
            r#"[[0, 1, "in"], [0, 2, "mul"], [0, 3, "const"], [3, 3, "value", 2.0],
                [2, 2, 1], [2, 2, 3], [0, 4, "root"], [2, 4, 2], [4, [4]]]"#,
        );
        let input = [0.25f32; 8];
        let mut out = vec![0.0f32; 8];
        engine.process(&[&input[..]], &mut [&mut out[..]]);
        assert!(out.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn register_resource_validates_channels() {
        let mut engine = engine();
        let err = engine
            .register_resource("wide", 40, 1, vec![0.0; 40])
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Capacity);
        assert!(engine.resources().is_empty());
    }

    #[test]
    fn prune_removes_unreferenced_resources() {
        let mut engine = engine();
        engine.register_resource("kept", 1, 1, vec![0.0]).unwrap();
        engine.register_resource("stale", 1, 1, vec![0.0]).unwrap();
        engine.apply_instructions_json(r#"[[0, 1, "sample"], [3, 1, "path", "kept"], [4, [1]]]"#);
        assert_eq!(engine.prune_resources(), vec!["stale".to_string()]);
        assert_eq!(engine.resources().names(), vec!["kept"]);
    }
}
