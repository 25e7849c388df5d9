//! Compilation of a pending [`Graph`] into a [`RenderGraph`].
//!
//! Compilation validates references, orders every pending node with Kahn's
//! algorithm (ties broken by ascending node id), restricts evaluation to the
//! nodes upstream of an active root, assigns scratch buffer units, and
//! resolves resources. Edges into delay-element kinds do not constrain the
//! order, so a cycle is legal only when it passes through one, whether or not
//! a root reaches it.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::BlockBuffers;
use crate::error::EngineError;
use crate::processor::{ProcessorRegistry, ProcessorSetup};
use crate::resource::ResourceRegistry;
use crate::value::Value;

use super::node::NodeId;
use super::pending::Graph;
use super::schedule::{RenderGraph, RenderStep, RootTap, SharedProcessor};

/// Everything compilation reads.
pub(crate) struct CompileInput<'a> {
    pub graph: &'a Graph,
    pub instances: &'a HashMap<NodeId, SharedProcessor>,
    pub kinds: &'a ProcessorRegistry,
    pub resources: &'a ResourceRegistry,
    pub setup: ProcessorSetup,
    pub generation: u64,
}

/// Checks that every edge and root names an existing node.
pub(crate) fn check_references(graph: &Graph) -> Result<(), EngineError> {
    for node in graph.nodes() {
        if let Some(missing) = node.upstream().find(|id| !graph.contains(*id)) {
            return Err(EngineError::DanglingReference {
                node: node.id,
                missing,
            });
        }
    }
    if let Some(&root) = graph.roots().iter().find(|id| !graph.contains(**id)) {
        return Err(EngineError::MissingRoot(root));
    }
    Ok(())
}

/// Orders the reachable nodes for evaluation.
///
/// Kahn's algorithm with a min-heap, so among ready nodes the lowest id is
/// always evaluated first.
pub(crate) fn evaluation_order(
    graph: &Graph,
    reachable: &BTreeSet<NodeId>,
    kinds: &ProcessorRegistry,
) -> Result<Vec<NodeId>, EngineError> {
    let mut in_degree: HashMap<NodeId, usize> = reachable.iter().map(|&id| (id, 0)).collect();
    let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    for &id in reachable {
        let Some(node) = graph.node(id) else {
            return Err(EngineError::NodeNotFound(id));
        };
        let delay = kinds
            .descriptor(&node.kind)
            .ok_or_else(|| EngineError::UnknownKind(node.kind.clone()))?
            .delay;
        if delay {
            continue;
        }
        for source in node.upstream() {
            dependents.entry(source).or_default().push(id);
            *in_degree.entry(id).or_default() += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&id, _)| Reverse(id))
        .collect();
    let mut order = Vec::with_capacity(reachable.len());

    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for next in dependents.get(&id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(*next));
                }
            }
        }
    }

    if order.len() < reachable.len() {
        // Every node left over sits on or behind a cycle; report the lowest.
        let stuck = reachable
            .iter()
            .copied()
            .find(|id| in_degree.get(id).is_some_and(|&d| d > 0))
            .unwrap_or(NodeId::new(0));
        return Err(EngineError::Cycle(stuck));
    }
    Ok(order)
}

/// Builds a snapshot from the pending graph.
pub(crate) fn compile(input: CompileInput<'_>) -> Result<RenderGraph, EngineError> {
    let CompileInput {
        graph,
        instances,
        kinds,
        resources,
        setup,
        generation,
    } = input;

    check_references(graph)?;
    let all: BTreeSet<NodeId> = graph.ids().collect();
    let reachable = graph.reachable();
    // Reachable nodes only depend on reachable nodes, so filtering the full
    // order gives the same sequence as sorting the reachable set alone.
    let order: Vec<NodeId> = evaluation_order(graph, &all, kinds)?
        .into_iter()
        .filter(|id| reachable.contains(id))
        .collect();
    debug!("graph_sort: {} of {} nodes in evaluation order", order.len(), graph.len());

    // Assign buffer units: one per output of every evaluated node.
    let mut first_unit: HashMap<NodeId, (usize, usize)> = HashMap::with_capacity(order.len());
    let mut units = 0;
    for &id in &order {
        let node = graph.node(id).ok_or(EngineError::NodeNotFound(id))?;
        let outputs = kinds
            .descriptor(&node.kind)
            .ok_or_else(|| EngineError::UnknownKind(node.kind.clone()))?
            .outputs;
        first_unit.insert(id, (units, outputs));
        units += outputs;
    }

    let mut steps = Vec::with_capacity(order.len());
    for &id in &order {
        let node = graph.node(id).ok_or(EngineError::NodeNotFound(id))?;
        let descriptor = kinds
            .descriptor(&node.kind)
            .ok_or_else(|| EngineError::UnknownKind(node.kind.clone()))?;

        let mut inputs = Vec::with_capacity(node.inputs.len());
        for edge in &node.inputs {
            let (base, count) = first_unit
                .get(&edge.source)
                .copied()
                .ok_or(EngineError::DanglingReference {
                    node: id,
                    missing: edge.source,
                })?;
            if edge.output >= count {
                return Err(EngineError::capacity("output channel", edge.output, count));
            }
            inputs.push(base + edge.output);
        }

        let resource = match descriptor.resource_key.and_then(|key| node.str_prop(key)) {
            Some(name) => Some(resources.resolve(name)?),
            None => None,
        };

        let processor = match instances.get(&id) {
            Some(shared) => Arc::clone(shared),
            None => {
                let created = kinds
                    .create(&node.kind, &setup)
                    .ok_or_else(|| EngineError::UnknownKind(node.kind.clone()))?;
                Arc::new(Mutex::new(created))
            }
        };

        let (unit, outputs) = first_unit[&id];
        steps.push(RenderStep {
            id,
            kind: node.kind.clone(),
            props: node.props.clone(),
            inputs,
            first_unit: unit,
            outputs,
            resource,
            processor,
            delay: descriptor.delay,
        });
    }

    let taps = graph
        .roots()
        .iter()
        .enumerate()
        .filter_map(|(position, &root)| {
            let (unit, outputs) = *first_unit.get(&root)?;
            if outputs == 0 {
                return None;
            }
            // Only `root` nodes name an output channel; other kinds use
            // `channel` for their source.
            let node = graph.node(root)?;
            let channel = match node.props.get("channel") {
                Some(Value::Number(n)) if node.kind == "root" && *n >= 0.0 => *n as usize,
                _ => position,
            };
            Some(RootTap {
                node: root,
                unit,
                channel,
            })
        })
        .collect();

    let delays = steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.delay)
        .map(|(index, _)| index)
        .collect();

    debug!("graph_buffers: {} steps, {units} buffer units", steps.len());

    Ok(RenderGraph {
        generation,
        steps,
        taps,
        delays,
        buffers: Mutex::new(BlockBuffers::new(units, setup.block_size)),
        units,
        sample_rate: setup.sample_rate,
        block_size: setup.block_size,
    })
}
