//! The batched instruction protocol.
//!
//! A batch is a JSON array of instructions, each an array whose first element
//! is a numeric opcode:
//!
//! | opcode | instruction       | layout                                   |
//! |-------:|-------------------|------------------------------------------|
//! | 0      | create-node       | `[0, id or null, kind]`                  |
//! | 1      | delete-node       | `[1, id]`                                |
//! | 2      | append-child      | `[2, parent, child, output?]`            |
//! | 3      | set-property      | `[3, id, name, value]`                   |
//! | 4      | activate-roots    | `[4, [id, ...]]`                         |
//! | 5      | commit            | `[5]`                                    |
//! | 6      | register-resource | `[6, name, channels, frames, data]`      |
//!
//! Parsing checks layout only and rejects the whole batch on the first
//! malformed instruction. Applying runs instructions in order, each checking
//! its own preconditions; the first failure stops the batch and everything
//! before it stays applied.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::error::{EngineError, ProtocolError};
use crate::graph::{GraphStore, NodeId};
use crate::processor::ProcessorRegistry;
use crate::resource::ResourceRegistry;
use crate::value::{Array, Value};

/// Largest integer a JSON number carries exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// One graph or registry mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Add a node. `id: None` lets the engine pick one.
    CreateNode {
        /// Requested id.
        id: Option<NodeId>,
        /// Kind tag.
        kind: String,
    },
    /// Remove a node.
    DeleteNode {
        /// Node to remove.
        id: NodeId,
    },
    /// Make `parent` read output `output` of `child`.
    AppendChild {
        /// Reading node.
        parent: NodeId,
        /// Upstream node.
        child: NodeId,
        /// Output channel of `child`.
        output: usize,
    },
    /// Set one node parameter.
    SetProperty {
        /// Target node.
        id: NodeId,
        /// Parameter name.
        name: String,
        /// New value.
        value: Value,
    },
    /// Replace the active roots.
    ActivateRoots {
        /// Root nodes, in output order.
        roots: Vec<NodeId>,
    },
    /// Publish the pending graph.
    Commit,
    /// Insert or replace a named resource.
    RegisterResource {
        /// Resource name.
        name: String,
        /// Channel count.
        channels: usize,
        /// Frames per channel.
        frames: usize,
        /// Planar samples.
        data: Vec<f32>,
    },
}

impl Instruction {
    /// Wire opcode.
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::CreateNode { .. } => 0,
            Instruction::DeleteNode { .. } => 1,
            Instruction::AppendChild { .. } => 2,
            Instruction::SetProperty { .. } => 3,
            Instruction::ActivateRoots { .. } => 4,
            Instruction::Commit => 5,
            Instruction::RegisterResource { .. } => 6,
        }
    }

    /// Short name used in logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::CreateNode { .. } => "create-node",
            Instruction::DeleteNode { .. } => "delete-node",
            Instruction::AppendChild { .. } => "append-child",
            Instruction::SetProperty { .. } => "set-property",
            Instruction::ActivateRoots { .. } => "activate-roots",
            Instruction::Commit => "commit",
            Instruction::RegisterResource { .. } => "register-resource",
        }
    }

    /// Parses one instruction. `index` is its 1-based position, for errors.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, ProtocolError> {
        let fields = value.as_array().map_err(|_| {
            ProtocolError::malformed(index, format!("expected an array, found {}", value.kind()))
        })?;
        let field = |i: usize, what: &str| {
            fields
                .get(i)
                .ok_or_else(|| ProtocolError::malformed(index, format!("missing {what}")))
        };
        let opcode = field(0, "opcode")?;

        let instruction = match integer(opcode) {
            Some(0) => {
                expect_len(index, "create-node", fields, 3, 3)?;
                let id_field = field(1, "node id")?;
                let id = if id_field.is_null() || id_field.is_undefined() {
                    None
                } else {
                    Some(node_id(index, id_field)?)
                };
                let kind = string(index, field(2, "node kind")?, "node kind")?;
                Instruction::CreateNode { id, kind }
            }
            Some(1) => {
                expect_len(index, "delete-node", fields, 2, 2)?;
                Instruction::DeleteNode {
                    id: node_id(index, field(1, "node id")?)?,
                }
            }
            Some(2) => {
                expect_len(index, "append-child", fields, 3, 4)?;
                let output = match fields.get(3) {
                    Some(v) => count(index, v, "output channel")?,
                    None => 0,
                };
                Instruction::AppendChild {
                    parent: node_id(index, field(1, "parent id")?)?,
                    child: node_id(index, field(2, "child id")?)?,
                    output,
                }
            }
            Some(3) => {
                expect_len(index, "set-property", fields, 4, 4)?;
                Instruction::SetProperty {
                    id: node_id(index, field(1, "node id")?)?,
                    name: string(index, field(2, "property name")?, "property name")?,
                    value: field(3, "property value")?.clone(),
                }
            }
            Some(4) => {
                expect_len(index, "activate-roots", fields, 2, 2)?;
                let list = field(1, "root list")?.as_array().map_err(|_| {
                    ProtocolError::malformed(index, "activate-roots expects an array of ids")
                })?;
                let roots = list
                    .iter()
                    .map(|v| node_id(index, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Instruction::ActivateRoots { roots }
            }
            Some(5) => {
                expect_len(index, "commit", fields, 1, 1)?;
                Instruction::Commit
            }
            Some(6) => {
                expect_len(index, "register-resource", fields, 5, 5)?;
                Instruction::RegisterResource {
                    name: string(index, field(1, "resource name")?, "resource name")?,
                    channels: count(index, field(2, "channel count")?, "channel count")?,
                    frames: count(index, field(3, "frame count")?, "frame count")?,
                    data: samples(index, field(4, "sample data")?)?,
                }
            }
            _ => {
                return Err(ProtocolError::malformed(
                    index,
                    format!("unknown opcode {opcode}"),
                ));
            }
        };
        Ok(instruction)
    }

    /// Encodes back into the wire layout.
    pub fn to_value(&self) -> Value {
        let op = Value::from(u32::from(self.opcode()));
        let id = |id: &NodeId| Value::from(id.raw());
        let fields: Array = match self {
            Instruction::CreateNode { id: node, kind } => vec![
                op,
                node.as_ref().map_or(Value::Null, id),
                Value::from(kind.as_str()),
            ],
            Instruction::DeleteNode { id: node } => vec![op, id(node)],
            Instruction::AppendChild {
                parent,
                child,
                output,
            } => vec![op, id(parent), id(child), Value::from(*output)],
            Instruction::SetProperty {
                id: node,
                name,
                value,
            } => vec![op, id(node), Value::from(name.as_str()), value.clone()],
            Instruction::ActivateRoots { roots } => {
                vec![op, Value::Array(roots.iter().map(id).collect())]
            }
            Instruction::Commit => vec![op],
            Instruction::RegisterResource {
                name,
                channels,
                frames,
                data,
            } => vec![
                op,
                Value::from(name.as_str()),
                Value::from(*channels),
                Value::from(*frames),
                Value::from(data.clone()),
            ],
        };
        Value::Array(fields)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::CreateNode { id: Some(id), kind } => write!(f, "create-node {id} ({kind})"),
            Instruction::CreateNode { id: None, kind } => write!(f, "create-node ({kind})"),
            Instruction::DeleteNode { id } => write!(f, "delete-node {id}"),
            Instruction::AppendChild {
                parent,
                child,
                output,
            } => write!(f, "append-child {child}[{output}] → {parent}"),
            Instruction::SetProperty { id, name, value } => {
                write!(f, "set-property {id}.{name} = {value}")
            }
            Instruction::ActivateRoots { roots } => write!(f, "activate-roots {roots:?}"),
            Instruction::Commit => write!(f, "commit"),
            Instruction::RegisterResource {
                name,
                channels,
                frames,
                ..
            } => write!(f, "register-resource '{name}' {channels}ch × {frames}"),
        }
    }
}

fn expect_len(
    index: usize,
    name: &str,
    fields: &[Value],
    min: usize,
    max: usize,
) -> Result<(), ProtocolError> {
    let found = fields.len();
    if (min..=max).contains(&found) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{min} to {max}")
    };
    Err(ProtocolError::malformed(
        index,
        format!("{name} takes {expected} fields, found {found}"),
    ))
}

/// Exact non-negative integer held by a Number.
fn integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= MAX_EXACT_INTEGER => {
            Some(*n as u64)
        }
        _ => None,
    }
}

fn node_id(index: usize, value: &Value) -> Result<NodeId, ProtocolError> {
    match value {
        Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER => {
            Ok(NodeId::new(*n as i64))
        }
        other => Err(ProtocolError::malformed(
            index,
            format!("node id must be an integer, found {other}"),
        )),
    }
}

fn count(index: usize, value: &Value, what: &str) -> Result<usize, ProtocolError> {
    integer(value)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            ProtocolError::malformed(
                index,
                format!("{what} must be a non-negative integer, found {value}"),
            )
        })
}

fn string(index: usize, value: &Value, what: &str) -> Result<String, ProtocolError> {
    value
        .as_str()
        .map(str::to_string)
        .map_err(|_| ProtocolError::malformed(index, format!("{what} must be a string")))
}

fn samples(index: usize, value: &Value) -> Result<Vec<f32>, ProtocolError> {
    match value {
        Value::Float32Array(data) => Ok(data.clone()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => Ok(*n as f32),
                other => Err(ProtocolError::malformed(
                    index,
                    format!("sample data must hold numbers, found {}", other.kind()),
                )),
            })
            .collect(),
        other => Err(ProtocolError::malformed(
            index,
            format!("sample data must be an array, found {}", other.kind()),
        )),
    }
}

/// Parses a whole batch. Any malformed instruction rejects the batch.
pub fn parse_batch(batch: &Value) -> Result<Vec<Instruction>, ProtocolError> {
    let items = batch
        .as_array()
        .map_err(|_| ProtocolError::NotABatch(batch.kind()))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| Instruction::from_value(i + 1, item))
        .collect()
}

/// Parses a batch from JSON text.
pub fn parse_batch_json(text: &str) -> Result<Vec<Instruction>, ProtocolError> {
    let value = Value::from_json_str(text)?;
    parse_batch(&value)
}

/// Outcome of a fully applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Instructions applied.
    pub applied: usize,
    /// Generations published by commits in this batch, explicit or implicit.
    pub commits: Vec<u64>,
    /// Ids the engine assigned to create-node instructions without one.
    pub assigned: Vec<NodeId>,
}

/// The instruction that stopped a batch.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("instruction {index} failed: {source}")]
pub struct BatchError {
    /// 1-based position; `len + 1` means the end-of-batch commit failed.
    pub index: usize,
    /// Why it failed.
    #[source]
    pub source: EngineError,
}

impl BatchError {
    /// Integer status for this failure.
    pub fn status(&self) -> i32 {
        i32::try_from(self.index).unwrap_or(i32::MAX)
    }
}

/// Mutable state a batch applies to.
pub(crate) struct BatchTarget<'a> {
    pub store: &'a mut GraphStore,
    pub resources: &'a mut ResourceRegistry,
    pub kinds: &'a ProcessorRegistry,
}

impl BatchTarget<'_> {
    fn apply_one(&mut self, instruction: &Instruction, report: &mut BatchReport) -> Result<(), EngineError> {
        match instruction {
            Instruction::CreateNode { id, kind } => {
                let created = self.store.create_node(*id, kind, self.kinds)?;
                if id.is_none() {
                    report.assigned.push(created);
                }
            }
            Instruction::DeleteNode { id } => self.store.delete_node(*id)?,
            Instruction::AppendChild {
                parent,
                child,
                output,
            } => self.store.append_child(*parent, *child, *output, self.kinds)?,
            Instruction::SetProperty { id, name, value } => {
                self.store.set_property(*id, name, value.clone(), self.kinds)?
            }
            Instruction::ActivateRoots { roots } => self.store.activate_roots(roots)?,
            Instruction::Commit => {
                let generation = self.store.commit(self.kinds, self.resources)?;
                report.commits.push(generation);
            }
            Instruction::RegisterResource {
                name,
                channels,
                frames,
                data,
            } => {
                self.resources
                    .register(name.as_str(), *channels, *frames, data.clone())?;
                self.store.mark_dirty();
            }
        }
        Ok(())
    }

    /// Applies instructions in order, stopping at the first failure, then
    /// commits if anything is left uncommitted.
    pub fn apply(&mut self, batch: &[Instruction]) -> Result<BatchReport, BatchError> {
        debug!("batch_apply: {} instructions", batch.len());
        let mut report = BatchReport::default();
        for (i, instruction) in batch.iter().enumerate() {
            self.apply_one(instruction, &mut report)
                .map_err(|source| BatchError {
                    index: i + 1,
                    source,
                })?;
            report.applied += 1;
        }
        if self.store.is_dirty() {
            let generation = self
                .store
                .commit(self.kinds, self.resources)
                .map_err(|source| BatchError {
                    index: batch.len() + 1,
                    source,
                })?;
            report.commits.push(generation);
        }
        Ok(report)
    }
}
