//! Identity-based replay of operations.
//!
//! An [`OperationIntent`] is captured against the tree an operation was
//! authored on and restored against whatever tree is current when the
//! operation is replayed. Restoring never fails because a target has gone
//! away: the concurrent change wins and the intent turns into fewer (or
//! zero) operations. Errors are reserved for store failures.

use std::collections::HashSet;

use arbor_tree::{Tree, TreeResult, APPEND};
use arbor_types::{NodeId, DETACHED_NODES_ROLE, ROOT_ID};
use tracing::trace;

use crate::operation::Operation;

/// An insert position expressed through the neighbouring siblings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedInsertPosition {
    /// The index as originally requested.
    pub index: i64,
    pub siblings_before: Vec<NodeId>,
    pub siblings_after: Vec<NodeId>,
}

impl CapturedInsertPosition {
    /// Split `siblings` around the requested index.
    pub fn capture(siblings: Vec<NodeId>, index: i64) -> Self {
        let split = match usize::try_from(index) {
            Ok(i) if index != APPEND => i.min(siblings.len()),
            _ => siblings.len(),
        };
        let mut siblings_before = siblings;
        let siblings_after = siblings_before.split_off(split);
        Self {
            index,
            siblings_before,
            siblings_after,
        }
    }

    /// Index into `current` that best matches the captured position.
    ///
    /// Appends stay appends and an unchanged list keeps the original index.
    /// Otherwise the insert goes after the nearest surviving left
    /// neighbour, else before the nearest surviving right neighbour, else
    /// at the end if nothing followed it originally, else at the start.
    pub fn find_index(&self, current: &[NodeId]) -> i64 {
        if self.index == APPEND {
            return APPEND;
        }
        let unchanged = current.len() == self.siblings_before.len() + self.siblings_after.len()
            && current
                .iter()
                .eq(self.siblings_before.iter().chain(&self.siblings_after));
        if unchanged {
            return self.index;
        }
        for left in self.siblings_before.iter().rev() {
            if let Some(i) = current.iter().position(|id| id == left) {
                return (i + 1) as i64;
            }
        }
        for right in &self.siblings_after {
            if let Some(i) = current.iter().position(|id| id == right) {
                return i as i64;
            }
        }
        if self.siblings_after.is_empty() {
            APPEND
        } else {
            0
        }
    }
}

/// An operation together with the context it was authored in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationIntent {
    original: Operation,
    position: Option<CapturedInsertPosition>,
}

fn detached_role() -> Option<String> {
    Some(DETACHED_NODES_ROLE.to_owned())
}

impl OperationIntent {
    pub(crate) fn new(original: Operation, position: Option<CapturedInsertPosition>) -> Self {
        Self { original, position }
    }

    /// The operation this intent was captured from.
    pub fn original(&self) -> &Operation {
        &self.original
    }

    /// The captured insert position, for add and move operations.
    pub fn position(&self) -> Option<&CapturedInsertPosition> {
        self.position.as_ref()
    }

    fn index_in(&self, current: &[NodeId], fallback: i64) -> i64 {
        match &self.position {
            Some(position) => position.find_index(current),
            None => fallback,
        }
    }

    /// Re-resolve the intent against `tree`, producing the operations that
    /// carry out the original effect there.
    pub fn restore(&self, tree: &Tree) -> TreeResult<Vec<Operation>> {
        let ops = match &self.original {
            Operation::SetProperty { node, .. } | Operation::SetReferenceTarget { node, .. } => {
                if tree.contains_node(*node)? {
                    vec![self.original.clone()]
                } else {
                    Vec::new()
                }
            }
            Operation::AddNewChild {
                parent,
                role,
                index,
                child,
                concept,
            } => {
                let (parent, role, index) = self.insert_target(tree, *parent, role, *index)?;
                vec![Operation::AddNewChild {
                    parent,
                    role,
                    index,
                    child: *child,
                    concept: concept.clone(),
                }]
            }
            Operation::AddNewChildren {
                parent,
                role,
                index,
                children,
            } => {
                let (parent, role, index) = self.insert_target(tree, *parent, role, *index)?;
                vec![Operation::AddNewChildren {
                    parent,
                    role,
                    index,
                    children: children.clone(),
                }]
            }
            Operation::MoveChild {
                new_parent,
                new_role,
                new_index,
                child,
            } => self.restore_move(tree, *new_parent, new_role, *new_index, *child)?,
            Operation::DeleteNode { node } => self.restore_delete(tree, std::slice::from_ref(node))?,
            Operation::DeleteNodes { nodes } => self.restore_delete(tree, nodes)?,
        };
        if ops.len() != 1 || ops[0] != self.original {
            trace!(
                original = %self.original,
                restored = ops.len(),
                "operation transformed during replay"
            );
        }
        Ok(ops)
    }

    /// Where to insert new nodes. A parent deleted concurrently sends the
    /// nodes to the detached role of the root.
    fn insert_target(
        &self,
        tree: &Tree,
        parent: NodeId,
        role: &Option<String>,
        index: i64,
    ) -> TreeResult<(NodeId, Option<String>, i64)> {
        if !tree.contains_node(parent)? {
            return Ok((ROOT_ID, detached_role(), APPEND));
        }
        let current = tree.get_children(parent, role.as_deref())?;
        Ok((parent, role.clone(), self.index_in(&current, index)))
    }

    fn restore_move(
        &self,
        tree: &Tree,
        new_parent: NodeId,
        new_role: &Option<String>,
        new_index: i64,
        child: NodeId,
    ) -> TreeResult<Vec<Operation>> {
        if !tree.contains_node(child)? {
            return Ok(Vec::new());
        }
        if !tree.contains_node(new_parent)? {
            return Ok(vec![Operation::MoveChild {
                new_parent: ROOT_ID,
                new_role: detached_role(),
                new_index: APPEND,
                child,
            }]);
        }
        // A concurrent move may have put the target inside the moved subtree.
        if tree.get_ancestors(new_parent, true)?.contains(&child) {
            return Ok(Vec::new());
        }
        let mut current = tree.get_children(new_parent, new_role.as_deref())?;
        current.retain(|id| *id != child);
        Ok(vec![Operation::MoveChild {
            new_parent,
            new_role: new_role.clone(),
            new_index: self.index_in(&current, new_index),
            child,
        }])
    }

    /// Delete what is still there. Children that appeared concurrently
    /// under a doomed node are moved to the detached role first.
    fn restore_delete(&self, tree: &Tree, nodes: &[NodeId]) -> TreeResult<Vec<Operation>> {
        let doomed: HashSet<NodeId> = nodes.iter().copied().collect();
        let mut rescued = Vec::new();
        let mut remaining = Vec::with_capacity(nodes.len());
        for &node in nodes {
            if !tree.contains_node(node)? {
                continue;
            }
            for child in tree.get_all_children(node)? {
                if !doomed.contains(&child) {
                    rescued.push(Operation::MoveChild {
                        new_parent: ROOT_ID,
                        new_role: detached_role(),
                        new_index: APPEND,
                        child,
                    });
                }
            }
            remaining.push(node);
        }

        let delete = match remaining.len() {
            0 => return Ok(rescued),
            n if n == nodes.len() => self.original.clone(),
            1 => Operation::DeleteNode { node: remaining[0] },
            _ => Operation::DeleteNodes { nodes: remaining },
        };
        rescued.push(delete);
        Ok(rescued)
    }
}
