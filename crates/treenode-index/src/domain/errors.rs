//! Error types for the hierarchical index
//!
//! `TreeError` is what callers see. `StoreError` and `CacheError` are raised
//! by the outbound ports and converted at the service boundary.

use super::value_objects::{NodeId, Priority, TreeScope};
use thiserror::Error;

/// All errors that can occur in index operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Move would make a node its own ancestor
    #[error("Cycle: cannot move node {node} under {new_parent}")]
    Cycle { node: NodeId, new_parent: NodeId },

    /// Two siblings would share a priority even after renumbering
    #[error("Priority conflict under {parent:?}: priority {priority} is taken")]
    PriorityConflict {
        parent: Option<NodeId>,
        priority: Priority,
    },

    /// Renumbering pass failed; nothing was written
    #[error("Renumber failed under {parent:?}: {reason}")]
    Renumber {
        parent: Option<NodeId>,
        reason: String,
    },

    /// Closure edges disagree with the node table
    #[error("Integrity violation in {scope}: expected {expected} edges, found {actual}")]
    Integrity {
        scope: TreeScope,
        expected: usize,
        actual: usize,
    },

    /// Referenced node does not exist
    #[error("Node not found: {0}")]
    NotFound(NodeId),

    /// Store timeout or contention; the whole operation may be retried
    #[error("Retryable: {0}")]
    Retryable(String),

    /// Position spec is malformed or inconsistent with the target parent
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Unrecognized delete mode or window direction
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-retryable store failure
    #[error("Store error: {0}")]
    Store(String),
}

impl TreeError {
    /// Whether the caller may safely rerun the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TreeError::Retryable(_))
    }
}

/// Errors raised by a record store adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(NodeId),

    #[error("Transaction timed out: {0}")]
    Timeout(String),

    #[error("Write conflict: {0}")]
    Contention(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for TreeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => TreeError::NotFound(id),
            StoreError::Timeout(msg) | StoreError::Contention(msg) => TreeError::Retryable(msg),
            other => TreeError::Store(other.to_string()),
        }
    }
}

/// Errors raised by a cache backend. Never fatal to a read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache payload could not be encoded: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Encode(err.to_string())
    }
}
