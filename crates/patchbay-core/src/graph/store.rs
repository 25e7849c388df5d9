//! Pending and live graphs with atomic publication.
//!
//! [`GraphStore`] owns the pending [`Graph`] that instructions edit and
//! publishes committed [`RenderGraph`] snapshots through an `ArcSwap`:
//!
//! - **Live snapshot**: `ArcSwap::load()` on the audio context, one wait-free
//!   load per block.
//! - **Commit**: a single `ArcSwap::swap()` on the control context. The
//!   superseded snapshot goes onto a retire list.
//! - **Reclamation**: the control context frees a retired snapshot once it
//!   holds the only reference, so the last drop never happens on the audio
//!   context.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::MAX_CHANNELS;
use crate::error::EngineError;
use crate::processor::{ProcessorRegistry, ProcessorSetup};
use crate::resource::ResourceRegistry;
use crate::value::Value;

use super::compile::{CompileInput, compile};
use super::edge::Edge;
use super::node::{GraphNode, NodeId};
use super::pending::Graph;
use super::schedule::{RenderGraph, SharedProcessor};

/// First id handed out when the caller leaves the choice to the engine.
/// Sits above the 32-bit range callers normally use.
const FIRST_ENGINE_ID: i64 = 1 << 32;

/// Pending graph, live snapshot, and the retire list.
pub struct GraphStore {
    pending: Graph,
    instances: HashMap<NodeId, SharedProcessor>,
    live: Arc<ArcSwap<RenderGraph>>,
    retired: Vec<Arc<RenderGraph>>,
    generation: u64,
    next_id: i64,
    dirty: bool,
    setup: ProcessorSetup,
}

impl GraphStore {
    /// Creates a store whose live snapshot renders silence.
    pub fn new(setup: ProcessorSetup) -> Self {
        let empty = RenderGraph::empty(0, setup.sample_rate, setup.block_size);
        Self {
            pending: Graph::new(),
            instances: HashMap::new(),
            live: Arc::new(ArcSwap::from_pointee(empty)),
            retired: Vec::new(),
            generation: 0,
            next_id: FIRST_ENGINE_ID,
            dirty: false,
            setup,
        }
    }

    /// The graph instructions edit.
    pub fn pending(&self) -> &Graph {
        &self.pending
    }

    /// The currently published snapshot.
    pub fn live(&self) -> Arc<RenderGraph> {
        self.live.load_full()
    }

    /// Shared handle the audio context loads snapshots from.
    pub fn live_handle(&self) -> Arc<ArcSwap<RenderGraph>> {
        Arc::clone(&self.live)
    }

    /// Generation of the last successful commit (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if the pending graph changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flags the pending state as needing a commit.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Number of superseded snapshots not yet freed.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Adds a node of a registered kind.
    ///
    /// With `id == None` the store assigns an unused id.
    pub fn create_node(
        &mut self,
        id: Option<NodeId>,
        kind: &str,
        kinds: &ProcessorRegistry,
    ) -> Result<NodeId, EngineError> {
        let id = match id {
            Some(id) if self.pending.contains(id) => return Err(EngineError::DuplicateNode(id)),
            Some(id) => id,
            None => self.allocate_id(),
        };
        let processor = kinds
            .create(kind, &self.setup)
            .ok_or_else(|| EngineError::UnknownKind(kind.to_string()))?;

        self.pending.insert(GraphNode::new(id, kind));
        self.instances.insert(id, Arc::new(Mutex::new(processor)));
        self.dirty = true;
        debug!("graph_add: {kind} node {id}");
        Ok(id)
    }

    /// Removes a node. Edges other nodes hold to it stay and are rejected at
    /// commit unless removed first.
    pub fn delete_node(&mut self, id: NodeId) -> Result<(), EngineError> {
        self.pending
            .remove(id)
            .ok_or(EngineError::NodeNotFound(id))?;
        self.instances.remove(&id);
        self.dirty = true;
        debug!("graph_remove: node {id}");
        Ok(())
    }

    /// Makes `parent` read output `output` of `child`, after its existing inputs.
    pub fn append_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        output: usize,
        kinds: &ProcessorRegistry,
    ) -> Result<(), EngineError> {
        let child_kind = &self
            .pending
            .node(child)
            .ok_or(EngineError::NodeNotFound(child))?
            .kind;
        let outputs = kinds
            .descriptor(child_kind)
            .ok_or_else(|| EngineError::UnknownKind(child_kind.clone()))?
            .outputs;
        if output >= outputs {
            return Err(EngineError::capacity("output channel", output, outputs));
        }
        let node = self
            .pending
            .node_mut(parent)
            .ok_or(EngineError::NodeNotFound(parent))?;
        node.inputs.push(Edge::new(child, output));
        self.dirty = true;
        debug!("graph_connect: {child}[{output}] → {parent}");
        Ok(())
    }

    /// Sets a node parameter after checking it against the kind's declaration.
    pub fn set_property(
        &mut self,
        id: NodeId,
        name: &str,
        value: Value,
        kinds: &ProcessorRegistry,
    ) -> Result<(), EngineError> {
        let node = self
            .pending
            .node_mut(id)
            .ok_or(EngineError::NodeNotFound(id))?;
        let descriptor = kinds
            .descriptor(&node.kind)
            .ok_or_else(|| EngineError::UnknownKind(node.kind.clone()))?;
        descriptor.validate_param(id, name, &value)?;
        node.props.insert(name.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    /// Replaces the set of active roots. Duplicates are ignored.
    pub fn activate_roots(&mut self, roots: &[NodeId]) -> Result<(), EngineError> {
        if roots.len() > MAX_CHANNELS {
            return Err(EngineError::capacity("root count", roots.len(), MAX_CHANNELS));
        }
        if let Some(&missing) = roots.iter().find(|id| !self.pending.contains(**id)) {
            return Err(EngineError::NodeNotFound(missing));
        }
        let mut seen = HashSet::new();
        let unique: Vec<NodeId> = roots.iter().copied().filter(|id| seen.insert(*id)).collect();
        debug!("graph_roots: {unique:?}");
        self.pending.set_roots(unique);
        self.dirty = true;
        Ok(())
    }

    /// Compiles the pending graph and publishes it as the live snapshot.
    ///
    /// On error the live snapshot is unchanged. Returns the new generation.
    pub fn commit(
        &mut self,
        kinds: &ProcessorRegistry,
        resources: &ResourceRegistry,
    ) -> Result<u64, EngineError> {
        self.reclaim();
        let generation = self.generation + 1;
        let snapshot = compile(CompileInput {
            graph: &self.pending,
            instances: &self.instances,
            kinds,
            resources,
            setup: self.setup,
            generation,
        })?;

        let previous = self.live.swap(Arc::new(snapshot));
        self.retired.push(previous);
        self.generation = generation;
        self.dirty = false;
        debug!("graph_commit: generation {generation} live");
        Ok(generation)
    }

    /// Frees retired snapshots no render still holds. Returns how many.
    pub fn reclaim(&mut self) -> usize {
        let before = self.retired.len();
        self.retired.retain(|snapshot| Arc::strong_count(snapshot) > 1);
        let freed = before - self.retired.len();
        if freed > 0 {
            debug!("graph_retire: freed {freed}, {} still held", self.retired.len());
        }
        freed
    }

    /// Deletes every pending node not upstream of an active root.
    ///
    /// Returns the deleted ids in ascending order.
    pub fn collect_garbage(&mut self) -> Vec<NodeId> {
        let reachable = self.pending.reachable();
        let garbage: Vec<NodeId> = self
            .pending
            .ids()
            .filter(|id| !reachable.contains(id))
            .collect();
        for &id in &garbage {
            self.pending.remove(id);
            self.instances.remove(&id);
        }
        if !garbage.is_empty() {
            self.dirty = true;
            debug!("graph_gc: removed {} nodes", garbage.len());
        }
        garbage
    }

    /// Clears the state of every processor and the live scratch buffers.
    ///
    /// Waits for any block in progress; a render attempted meanwhile renders
    /// the affected nodes as silence.
    pub fn reset_processors(&self) {
        for processor in self.instances.values() {
            processor.lock().reset();
        }
        self.live.load().buffers.lock().clear_all();
        debug!("graph_reset: {} processors", self.instances.len());
    }

    /// Resource names referenced by pending nodes.
    pub fn referenced_resources<'a>(&'a self, kinds: &ProcessorRegistry) -> HashSet<&'a str> {
        self.pending
            .nodes()
            .filter_map(|node| {
                let key = kinds.descriptor(&node.kind)?.resource_key?;
                node.str_prop(key)
            })
            .collect()
    }

    fn allocate_id(&mut self) -> NodeId {
        while self.pending.contains(NodeId::new(self.next_id)) {
            self.next_id += 1;
        }
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn store() -> (GraphStore, ProcessorRegistry, ResourceRegistry) {
        let setup = ProcessorSetup {
            sample_rate: 48000.0,
            block_size: 16,
        };
        (
            GraphStore::new(setup),
            ProcessorRegistry::new(),
            ResourceRegistry::new(),
        )
    }

    #[test]
    fn create_rejects_duplicates_and_unknown_kinds() {
        let (mut store, kinds, _) = store();
        let id = NodeId::new(1);
        store.create_node(Some(id), "const", &kinds).unwrap();
        assert_eq!(
            store.create_node(Some(id), "const", &kinds),
            Err(EngineError::DuplicateNode(id))
        );
        assert_eq!(
            store.create_node(Some(NodeId::new(2)), "reverb", &kinds),
            Err(EngineError::UnknownKind("reverb".into()))
        );
        assert_eq!(store.pending().len(), 1);
    }

    #[test]
    fn engine_assigned_ids_are_unique() {
        let (mut store, kinds, _) = store();
        let a = store.create_node(None, "const", &kinds).unwrap();
        let b = store.create_node(None, "const", &kinds).unwrap();
        assert_ne!(a, b);
        assert!(a.raw() >= FIRST_ENGINE_ID);
    }

    #[test]
    fn commit_publishes_and_retires() {
        let (mut store, kinds, resources) = store();
        let c = store.create_node(Some(NodeId::new(1)), "const", &kinds).unwrap();
        let r = store.create_node(Some(NodeId::new(2)), "root", &kinds).unwrap();
        store.append_child(r, c, 0, &kinds).unwrap();
        store.activate_roots(&[r]).unwrap();
        assert!(store.is_dirty());

        let held = store.live();
        assert_eq!(held.generation(), 0);
        assert_eq!(store.commit(&kinds, &resources), Ok(1));
        assert!(!store.is_dirty());
        assert_eq!(store.live().order().collect::<Vec<_>>(), vec![c, r]);

        // The old snapshot is still held here, so it cannot be freed yet.
        assert_eq!(store.reclaim(), 0);
        drop(held);
        assert_eq!(store.reclaim(), 1);
        assert_eq!(store.retired_len(), 0);
    }

    #[test]
    fn failed_commit_leaves_live_unchanged() {
        let (mut store, kinds, resources) = store();
        let a = store.create_node(Some(NodeId::new(1)), "add", &kinds).unwrap();
        let b = store.create_node(Some(NodeId::new(2)), "add", &kinds).unwrap();
        store.append_child(a, b, 0, &kinds).unwrap();
        store.append_child(b, a, 0, &kinds).unwrap();
        store.activate_roots(&[a]).unwrap();

        let err = store.commit(&kinds, &resources).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Structural);
        assert_eq!(store.live().generation(), 0);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn deleted_upstream_is_dangling_at_commit() {
        let (mut store, kinds, resources) = store();
        let c = store.create_node(Some(NodeId::new(1)), "const", &kinds).unwrap();
        let r = store.create_node(Some(NodeId::new(2)), "root", &kinds).unwrap();
        store.append_child(r, c, 0, &kinds).unwrap();
        store.activate_roots(&[r]).unwrap();
        store.delete_node(c).unwrap();
        assert_eq!(
            store.commit(&kinds, &resources),
            Err(EngineError::DanglingReference { node: r, missing: c })
        );
    }

    #[test]
    fn append_child_checks_output_range() {
        let (mut store, kinds, _) = store();
        let c = store.create_node(Some(NodeId::new(1)), "const", &kinds).unwrap();
        let r = store.create_node(Some(NodeId::new(2)), "root", &kinds).unwrap();
        let err = store.append_child(r, c, 1, &kinds).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Capacity);
        assert_eq!(
            store.append_child(r, NodeId::new(9), 0, &kinds),
            Err(EngineError::NodeNotFound(NodeId::new(9)))
        );
    }

    #[test]
    fn processor_state_survives_recommit() {
        let (mut store, kinds, resources) = store();
        let p = store.create_node(Some(NodeId::new(1)), "phasor", &kinds).unwrap();
        let r = store.create_node(Some(NodeId::new(2)), "root", &kinds).unwrap();
        store.append_child(r, p, 0, &kinds).unwrap();
        store.activate_roots(&[r]).unwrap();
        store.commit(&kinds, &resources).unwrap();
        let first = store.live();
        store
            .set_property(p, "freq", Value::from(110.0), &kinds)
            .unwrap();
        store.commit(&kinds, &resources).unwrap();
        let second = store.live();
        let a = &first.step(p).unwrap().processor;
        let b = &second.step(p).unwrap().processor;
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn reset_clears_processor_state() {
        let (mut store, kinds, resources) = store();
        let p = store.create_node(Some(NodeId::new(1)), "phasor", &kinds).unwrap();
        store
            .set_property(p, "freq", Value::from(12000.0), &kinds)
            .unwrap();
        store.activate_roots(&[p]).unwrap();
        store.commit(&kinds, &resources).unwrap();

        let events = crate::event::EventChannel::new(4);
        let live = store.live();
        let mut out = [0.0f32; 3];
        live.render(&[], &mut [&mut out[..]], &events);
        assert_eq!(out, [0.0, 0.25, 0.5]);

        store.reset_processors();
        live.render(&[], &mut [&mut out[..]], &events);
        assert_eq!(out, [0.0, 0.25, 0.5]);
    }

    #[test]
    fn garbage_collection_keeps_reachable_nodes() {
        let (mut store, kinds, _) = store();
        let c = store.create_node(Some(NodeId::new(1)), "const", &kinds).unwrap();
        let r = store.create_node(Some(NodeId::new(2)), "root", &kinds).unwrap();
        let stray = store.create_node(Some(NodeId::new(3)), "phasor", &kinds).unwrap();
        store.append_child(r, c, 0, &kinds).unwrap();
        store.activate_roots(&[r]).unwrap();
        assert_eq!(store.collect_garbage(), vec![stray]);
        assert!(store.pending().contains(c));
        assert!(!store.pending().contains(stray));
    }

    #[test]
    fn missing_resource_rejects_commit() {
        let (mut store, kinds, mut resources) = store();
        let s = store.create_node(Some(NodeId::new(1)), "sample", &kinds).unwrap();
        store
            .set_property(s, "path", Value::from("kick"), &kinds)
            .unwrap();
        store.activate_roots(&[s]).unwrap();
        assert_eq!(
            store.commit(&kinds, &resources),
            Err(EngineError::ResourceNotFound("kick".into()))
        );
        resources.register("kick", 1, 2, vec![0.5, 0.5]).unwrap();
        store.commit(&kinds, &resources).unwrap();
        let live = store.live();
        let cached = live.step(s).unwrap().resource().unwrap();
        assert_eq!(cached.data(), &[0.5, 0.5]);
        assert_eq!(store.referenced_resources(&kinds), HashSet::from(["kick"]));
    }
}
