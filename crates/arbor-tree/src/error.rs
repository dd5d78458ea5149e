//! Error types for tree operations.

use arbor_store::StoreError;
use arbor_types::NodeId;

/// Errors that can occur while reading or writing a tree.
///
/// Everything except [`TreeError::Store`] is a structural violation caused
/// by the caller; the receiving tree is never modified.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The node does not exist in this snapshot.
    #[error("node not found: {0:#x}")]
    NodeNotFound(NodeId),

    /// A node with this id already exists.
    #[error("duplicate node id: {0:#x}")]
    DuplicateNode(NodeId),

    /// Node id 0 is reserved for "no parent".
    #[error("invalid node id: {0:#x}")]
    InvalidNodeId(NodeId),

    /// Moving `child` under `target` would make it its own ancestor.
    #[error("moving {child:#x} under {target:#x} would create a cycle")]
    CycleDetected { child: NodeId, target: NodeId },

    /// The root node cannot be moved.
    #[error("the root node cannot be moved")]
    MoveRoot,

    /// The root node cannot be deleted.
    #[error("the root node cannot be deleted")]
    DeleteRoot,

    /// Only leaf nodes can be deleted.
    #[error("node {0:#x} still has children")]
    HasChildren(NodeId),

    /// Insert position past the end of the role.
    #[error("index {index} out of range for role {role:?} of {parent:#x} (len {len})")]
    IndexOutOfRange {
        parent: NodeId,
        role: Option<String>,
        index: i64,
        len: usize,
    },

    /// Underlying store failure, including integrity errors.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
