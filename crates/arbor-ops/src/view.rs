//! Scoped, single-owner editing front-end.

use arbor_tree::{Tree, TreeResult};
use arbor_types::{ConceptReference, NodeId, NodeReference};

use crate::operation::{NewChild, Operation};

/// Applies operations to a tree and records them.
///
/// A view lives for one edit transaction or one merge replay. It is not
/// shared; [`WriteView::finish`] hands back the resulting immutable tree
/// together with the operation log. A failed operation leaves both the
/// tree and the log as they were.
#[derive(Debug)]
pub struct WriteView {
    tree: Tree,
    log: Vec<Operation>,
}

impl WriteView {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            log: Vec::new(),
        }
    }

    /// The tree as it stands after all applied operations.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Operations applied so far, in order.
    pub fn operations(&self) -> &[Operation] {
        &self.log
    }

    /// Apply and record an operation. Returns the ids it created.
    pub fn apply(&mut self, op: Operation) -> TreeResult<Vec<NodeId>> {
        let applied = op.apply(&self.tree)?;
        self.tree = applied.tree;
        self.log.push(op);
        Ok(applied.created)
    }

    pub fn set_property(&mut self, node: NodeId, role: &str, value: Option<&str>) -> TreeResult<()> {
        self.apply(Operation::SetProperty {
            node,
            role: role.to_owned(),
            value: value.map(str::to_owned),
        })?;
        Ok(())
    }

    pub fn set_reference_target(
        &mut self,
        node: NodeId,
        role: &str,
        target: Option<NodeReference>,
    ) -> TreeResult<()> {
        self.apply(Operation::SetReferenceTarget {
            node,
            role: role.to_owned(),
            target,
        })?;
        Ok(())
    }

    pub fn add_new_child(
        &mut self,
        parent: NodeId,
        role: Option<&str>,
        index: i64,
        child: NodeId,
        concept: Option<ConceptReference>,
    ) -> TreeResult<NodeId> {
        self.apply(Operation::AddNewChild {
            parent,
            role: role.map(str::to_owned),
            index,
            child,
            concept,
        })?;
        Ok(child)
    }

    pub fn add_new_children(
        &mut self,
        parent: NodeId,
        role: Option<&str>,
        index: i64,
        children: Vec<NewChild>,
    ) -> TreeResult<Vec<NodeId>> {
        self.apply(Operation::AddNewChildren {
            parent,
            role: role.map(str::to_owned),
            index,
            children,
        })
    }

    pub fn move_child(
        &mut self,
        new_parent: NodeId,
        new_role: Option<&str>,
        new_index: i64,
        child: NodeId,
    ) -> TreeResult<()> {
        self.apply(Operation::MoveChild {
            new_parent,
            new_role: new_role.map(str::to_owned),
            new_index,
            child,
        })?;
        Ok(())
    }

    pub fn delete_node(&mut self, node: NodeId) -> TreeResult<()> {
        self.apply(Operation::DeleteNode { node })?;
        Ok(())
    }

    /// Delete `node` and everything below it as one operation, deepest
    /// nodes first.
    pub fn delete_subtree(&mut self, node: NodeId) -> TreeResult<()> {
        let mut nodes = self.tree.descendants(node, true)?;
        nodes.reverse();
        let op = match nodes.as_slice() {
            [single] => Operation::DeleteNode { node: *single },
            _ => Operation::DeleteNodes { nodes },
        };
        self.apply(op)?;
        Ok(())
    }

    /// End the transaction.
    pub fn finish(self) -> (Tree, Vec<Operation>) {
        (self.tree, self.log)
    }
}
