//! Node-level identifiers and reference targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::TreeId;

/// Identifier of a node, unique within one tree lineage.
pub type NodeId = u64;

/// Id of the root node of every tree.
pub const ROOT_ID: NodeId = 1;

/// Child role on the root that retains nodes removed from the visible tree.
///
/// Nodes land here when an operation replayed during a merge targets a
/// parent that no longer exists, so later references and moves can still
/// resolve them.
pub const DETACHED_NODES_ROLE: &str = "detached";

/// Type tag of a node (the concept it instantiates).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptReference(String);

impl ConceptReference {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn uid(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConceptReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target of a reference edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeReference {
    /// A node in the same tree.
    Local { node: NodeId },
    /// A node in another repository.
    Foreign { tree: TreeId, node: NodeId },
}

impl NodeReference {
    pub fn local(node: NodeId) -> Self {
        Self::Local { node }
    }

    /// The target id if the reference points into the same tree.
    pub fn local_node(&self) -> Option<NodeId> {
        match self {
            Self::Local { node } => Some(*node),
            Self::Foreign { .. } => None,
        }
    }
}

impl fmt::Display for NodeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { node } => write!(f, "{node:#x}"),
            Self::Foreign { tree, node } => write!(f, "{tree}/{node:#x}"),
        }
    }
}
