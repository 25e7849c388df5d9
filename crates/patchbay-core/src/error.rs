//! Error types for graph mutation, batch parsing, and configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::NodeId;
use crate::value::{ValueError, ValueKind};

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A value held the wrong variant.
    TypeMismatch,
    /// An unknown node id, node kind, or resource name.
    Reference,
    /// A fixed limit was exceeded.
    Capacity,
    /// The graph cannot be committed as built.
    Structural,
}

/// Errors raised while validating or applying a graph mutation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A value was read through the wrong typed accessor.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// A parameter value does not match what the node kind expects.
    #[error("parameter '{param}' of {kind} node {node}: {source}")]
    InvalidParameter {
        /// Node receiving the parameter.
        node: NodeId,
        /// Kind tag of the node.
        kind: String,
        /// Parameter name.
        param: String,
        /// The underlying mismatch.
        #[source]
        source: ValueError,
    },

    /// The referenced node does not exist in the pending graph.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// A node with this id already exists.
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    /// No processor is registered under this kind tag.
    #[error("unknown node kind '{0}'")]
    UnknownKind(String),

    /// No resource is registered under this name.
    #[error("resource '{0}' not found")]
    ResourceNotFound(String),

    /// A fixed limit was exceeded.
    #[error("{what} {value} exceeds the limit of {limit}")]
    Capacity {
        /// What was being counted.
        what: &'static str,
        /// The offending value.
        value: usize,
        /// The maximum allowed.
        limit: usize,
    },

    /// A channel-index parameter was set below zero.
    #[error("parameter '{param}' of node {node} is a channel index, found {value}")]
    NegativeChannel {
        /// Node receiving the parameter.
        node: NodeId,
        /// Parameter name.
        param: String,
        /// The rejected value.
        value: f64,
    },

    /// Sample data does not match the declared channel and frame counts.
    #[error("resource '{name}' carries {actual} samples, expected {expected}")]
    ResourceSize {
        /// Resource name.
        name: String,
        /// Declared channels × frames.
        expected: usize,
        /// Samples actually supplied.
        actual: usize,
    },

    /// A cycle passes through this node without a delay element.
    #[error("cycle through node {0} has no delay element")]
    Cycle(NodeId),

    /// A node reads from a node that no longer exists.
    #[error("node {node} reads from missing node {missing}")]
    DanglingReference {
        /// The reading node.
        node: NodeId,
        /// The missing upstream node.
        missing: NodeId,
    },

    /// An active root no longer exists.
    #[error("root node {0} does not exist")]
    MissingRoot(NodeId),
}

impl EngineError {
    /// Returns the taxonomy bucket for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Value(_) | Self::InvalidParameter { .. } => ErrorCategory::TypeMismatch,
            Self::NodeNotFound(_)
            | Self::DuplicateNode(_)
            | Self::UnknownKind(_)
            | Self::ResourceNotFound(_) => ErrorCategory::Reference,
            Self::Capacity { .. } | Self::NegativeChannel { .. } | Self::ResourceSize { .. } => {
                ErrorCategory::Capacity
            }
            Self::Cycle(_) | Self::DanglingReference { .. } | Self::MissingRoot(_) => {
                ErrorCategory::Structural
            }
        }
    }

    /// Create a capacity error.
    pub fn capacity(what: &'static str, value: usize, limit: usize) -> Self {
        EngineError::Capacity { what, value, limit }
    }
}

/// Errors that reject a whole batch before any instruction runs.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The batch text is not valid JSON.
    #[error("failed to parse batch JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The batch is not an array.
    #[error("batch must be an array of instructions, found {0}")]
    NotABatch(ValueKind),

    /// An instruction does not match the wire layout.
    #[error("instruction {index}: {reason}")]
    Malformed {
        /// 1-based position in the batch.
        index: usize,
        /// What was wrong.
        reason: String,
    },
}

impl ProtocolError {
    /// Create a malformed-instruction error.
    pub fn malformed(index: usize, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            index,
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A field holds a value the engine cannot run with.
    #[error("invalid config field '{field}': {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn categories_follow_taxonomy() {
        let mismatch = EngineError::from(ValueError::TypeMismatch {
            expected: ValueKind::Number,
            found: ValueKind::String,
        });
        assert_eq!(mismatch.category(), ErrorCategory::TypeMismatch);
        assert_eq!(
            EngineError::NodeNotFound(NodeId::new(3)).category(),
            ErrorCategory::Reference
        );
        assert_eq!(
            EngineError::capacity("channel count", 33, 32).category(),
            ErrorCategory::Capacity
        );
        assert_eq!(
            EngineError::Cycle(NodeId::new(1)).category(),
            ErrorCategory::Structural
        );
    }

    #[test]
    fn capacity_display() {
        let err = EngineError::capacity("channel count", 40, 32);
        assert_eq!(err.to_string(), "channel count 40 exceeds the limit of 32");
    }

    #[test]
    fn invalid_parameter_exposes_source() {
        let err = EngineError::InvalidParameter {
            node: NodeId::new(7),
            kind: "const".to_string(),
            param: "value".to_string(),
            source: ValueError::TypeMismatch {
                expected: ValueKind::Number,
                found: ValueKind::String,
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("'value'"), "got: {err}");
    }

    #[test]
    fn read_file_display() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "mock");
        let err = ConfigError::read_file("/a/b.toml", io);
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/b.toml"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn malformed_display_carries_index() {
        let err = ProtocolError::malformed(4, "missing node id");
        assert_eq!(err.to_string(), "instruction 4: missing node id");
    }
}
