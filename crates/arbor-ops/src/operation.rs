//! The closed set of tree operations.

use arbor_tree::{Tree, TreeResult};
use arbor_types::{ConceptReference, NodeId, NodeReference};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::intent::{CapturedInsertPosition, OperationIntent};

/// A node to be created by an add operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChild {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<ConceptReference>,
}

/// A self-contained tree edit.
///
/// Indices follow the tree conventions: `-1` appends, and a move index
/// refers to the target list without the moved node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    SetProperty {
        node: NodeId,
        role: String,
        value: Option<String>,
    },
    SetReferenceTarget {
        node: NodeId,
        role: String,
        target: Option<NodeReference>,
    },
    AddNewChild {
        parent: NodeId,
        role: Option<String>,
        index: i64,
        child: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        concept: Option<ConceptReference>,
    },
    AddNewChildren {
        parent: NodeId,
        role: Option<String>,
        index: i64,
        children: Vec<NewChild>,
    },
    MoveChild {
        new_parent: NodeId,
        new_role: Option<String>,
        new_index: i64,
        child: NodeId,
    },
    DeleteNode {
        node: NodeId,
    },
    DeleteNodes {
        nodes: Vec<NodeId>,
    },
}

/// Result of applying an operation.
#[derive(Clone, Debug)]
pub struct Applied {
    pub tree: Tree,
    /// Ids of nodes created by the operation, in order.
    pub created: Vec<NodeId>,
}

impl Operation {
    /// Short name of the variant, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetProperty { .. } => "set_property",
            Self::SetReferenceTarget { .. } => "set_reference_target",
            Self::AddNewChild { .. } => "add_new_child",
            Self::AddNewChildren { .. } => "add_new_children",
            Self::MoveChild { .. } => "move_child",
            Self::DeleteNode { .. } => "delete_node",
            Self::DeleteNodes { .. } => "delete_nodes",
        }
    }

    /// Execute against `tree`, returning the new tree.
    pub fn apply(&self, tree: &Tree) -> TreeResult<Applied> {
        trace!(op = %self, "applying operation");
        let (tree, created) = match self {
            Self::SetProperty { node, role, value } => {
                (tree.set_property(*node, role, value.as_deref())?, Vec::new())
            }
            Self::SetReferenceTarget { node, role, target } => (
                tree.set_reference_target(*node, role, target.clone())?,
                Vec::new(),
            ),
            Self::AddNewChild {
                parent,
                role,
                index,
                child,
                concept,
            } => (
                tree.add_new_child(*parent, role.as_deref(), *index, *child, concept.clone())?,
                vec![*child],
            ),
            Self::AddNewChildren {
                parent,
                role,
                index,
                children,
            } => {
                let specs: Vec<(NodeId, Option<ConceptReference>)> =
                    children.iter().map(|c| (c.id, c.concept.clone())).collect();
                (
                    tree.add_new_children(*parent, role.as_deref(), *index, &specs)?,
                    children.iter().map(|c| c.id).collect(),
                )
            }
            Self::MoveChild {
                new_parent,
                new_role,
                new_index,
                child,
            } => (
                tree.move_child(*new_parent, new_role.as_deref(), *new_index, *child)?,
                Vec::new(),
            ),
            Self::DeleteNode { node } => (tree.delete_node(*node)?, Vec::new()),
            Self::DeleteNodes { nodes } => (tree.delete_nodes(nodes)?, Vec::new()),
        };
        Ok(Applied { tree, created })
    }

    /// Capture the intent of this operation against the tree it was
    /// authored on.
    ///
    /// Insert positions are recorded relative to the surrounding siblings
    /// so they survive concurrent edits of the same child list.
    pub fn capture_intent(&self, tree: &Tree) -> TreeResult<OperationIntent> {
        let position = match self {
            Self::AddNewChild {
                parent, role, index, ..
            }
            | Self::AddNewChildren {
                parent, role, index, ..
            } => {
                let siblings = tree.get_children(*parent, role.as_deref())?;
                Some(CapturedInsertPosition::capture(siblings, *index))
            }
            Self::MoveChild {
                new_parent,
                new_role,
                new_index,
                child,
            } => {
                let mut siblings = tree.get_children(*new_parent, new_role.as_deref())?;
                siblings.retain(|id| id != child);
                Some(CapturedInsertPosition::capture(siblings, *new_index))
            }
            Self::SetProperty { .. }
            | Self::SetReferenceTarget { .. }
            | Self::DeleteNode { .. }
            | Self::DeleteNodes { .. } => None,
        };
        Ok(OperationIntent::new(self.clone(), position))
    }
}

fn role_label(role: &Option<String>) -> &str {
    role.as_deref().unwrap_or("<default>")
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetProperty { node, role, value } => match value {
                Some(value) => write!(f, "set_property {node:#x}.{role} = {value:?}"),
                None => write!(f, "set_property {node:#x}.{role} = <unset>"),
            },
            Self::SetReferenceTarget { node, role, target } => match target {
                Some(target) => write!(f, "set_reference_target {node:#x}.{role} -> {target}"),
                None => write!(f, "set_reference_target {node:#x}.{role} -> <unset>"),
            },
            Self::AddNewChild {
                parent,
                role,
                index,
                child,
                ..
            } => write!(
                f,
                "add_new_child {child:#x} at {parent:#x}.{}[{index}]",
                role_label(role)
            ),
            Self::AddNewChildren {
                parent,
                role,
                index,
                children,
            } => write!(
                f,
                "add_new_children {} nodes at {parent:#x}.{}[{index}]",
                children.len(),
                role_label(role)
            ),
            Self::MoveChild {
                new_parent,
                new_role,
                new_index,
                child,
            } => write!(
                f,
                "move_child {child:#x} to {new_parent:#x}.{}[{new_index}]",
                role_label(new_role)
            ),
            Self::DeleteNode { node } => write!(f, "delete_node {node:#x}"),
            Self::DeleteNodes { nodes } => write!(f, "delete_nodes {nodes:x?}"),
        }
    }
}
