//! Error types for DOM operations
//!
//! Flat hierarchy. Malformed provenance is never an error here: the sidecar
//! store recovers from it locally and records a diagnostic instead.

use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid node type: expected {expected}, got {actual}")]
    InvalidNodeType { expected: String, actual: String },

    #[error("Hierarchy request error: cannot insert node {child} under {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("Handler failed on node {node}: {source}")]
    Handler {
        node: NodeId,
        #[source]
        source: Box<DomError>,
    },

    #[error("Traversal lost its position: node {0} was detached by a handler that asked to continue")]
    TraversalPosition(NodeId),

    #[error("Encapsulation violation: about id {about} reappears on non-adjacent node {node}")]
    Encapsulation { about: String, node: NodeId },

    #[error("Extension <{tag}> failed: {message}")]
    Extension { tag: String, message: String },

    #[error("Unknown extension tag: {0}")]
    UnknownExtension(String),

    #[error("Pass '{pass}' failed: {source}")]
    PassFailed {
        pass: String,
        #[source]
        source: Box<DomError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DomError {
    /// Name of the pipeline pass that failed, if this error came from one.
    pub fn failed_pass(&self) -> Option<&str> {
        match self {
            DomError::PassFailed { pass, .. } => Some(pass),
            _ => None,
        }
    }
}
