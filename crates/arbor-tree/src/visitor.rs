//! Change notification between two snapshots.

use std::collections::BTreeSet;

use arbor_store::Record;
use arbor_types::{NodeId, ObjectId};

use crate::error::TreeResult;
use crate::hamt;
use crate::node::NodeData;
use crate::tree::Tree;

/// Receives the delta between two trees.
///
/// A node whose record changed gets one callback per changed aspect. Child
/// list changes are reported on the parent, containment changes on the
/// child that moved.
pub trait TreeChangeVisitor {
    fn property_changed(&mut self, node: NodeId, role: &str);
    fn reference_changed(&mut self, node: NodeId, role: &str);
    fn children_changed(&mut self, node: NodeId, role: Option<&str>);
    fn containment_changed(&mut self, node: NodeId);

    fn node_added(&mut self, _node: NodeId) {}
    fn node_removed(&mut self, _node: NodeId) {}
}

/// A single reported change, for visitors that just collect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeChange {
    PropertyChanged { node: NodeId, role: String },
    ReferenceChanged { node: NodeId, role: String },
    ChildrenChanged { node: NodeId, role: Option<String> },
    ContainmentChanged { node: NodeId },
    NodeAdded { node: NodeId },
    NodeRemoved { node: NodeId },
}

impl TreeChangeVisitor for Vec<TreeChange> {
    fn property_changed(&mut self, node: NodeId, role: &str) {
        self.push(TreeChange::PropertyChanged {
            node,
            role: role.to_owned(),
        });
    }

    fn reference_changed(&mut self, node: NodeId, role: &str) {
        self.push(TreeChange::ReferenceChanged {
            node,
            role: role.to_owned(),
        });
    }

    fn children_changed(&mut self, node: NodeId, role: Option<&str>) {
        self.push(TreeChange::ChildrenChanged {
            node,
            role: role.map(str::to_owned),
        });
    }

    fn containment_changed(&mut self, node: NodeId) {
        self.push(TreeChange::ContainmentChanged { node });
    }

    fn node_added(&mut self, node: NodeId) {
        self.push(TreeChange::NodeAdded { node });
    }

    fn node_removed(&mut self, node: NodeId) {
        self.push(TreeChange::NodeRemoved { node });
    }
}

impl Tree {
    /// Report every change that turns `old` into `self`.
    ///
    /// Index blocks shared by both snapshots are never read, so the cost
    /// follows the size of the change rather than the size of the tree.
    pub fn visit_changes(&self, old: &Tree, visitor: &mut dyn TreeChangeVisitor) -> TreeResult<()> {
        let store = &**self.store();
        for change in hamt::diff(store, &old.data().nodes, &self.data().nodes)? {
            match (change.old, change.new) {
                (None, Some(_)) => visitor.node_added(change.key),
                (Some(_), None) => visitor.node_removed(change.key),
                (Some(before), Some(after)) => {
                    let before = load_record(self, &before)?;
                    let after = load_record(self, &after)?;
                    compare(&before, &after, visitor);
                }
                (None, None) => {}
            }
        }
        Ok(())
    }
}

fn load_record(tree: &Tree, record: &ObjectId) -> TreeResult<NodeData> {
    Ok(NodeData::from_stored_object(&tree.store().get_required(record)?)?)
}

fn compare(before: &NodeData, after: &NodeData, visitor: &mut dyn TreeChangeVisitor) {
    let node = after.id;

    let roles: BTreeSet<&String> = before.properties.keys().chain(after.properties.keys()).collect();
    for role in roles {
        if before.properties.get(role) != after.properties.get(role) {
            visitor.property_changed(node, role);
        }
    }

    let roles: BTreeSet<&String> = before.references.keys().chain(after.references.keys()).collect();
    for role in roles {
        if before.references.get(role) != after.references.get(role) {
            visitor.reference_changed(node, role);
        }
    }

    let roles: BTreeSet<Option<&str>> = before.child_roles().chain(after.child_roles()).collect();
    for role in roles {
        if before.children_in(role) != after.children_in(role) {
            visitor.children_changed(node, role);
        }
    }

    if before.parent != after.parent || before.role != after.role {
        visitor.containment_changed(node);
    }
}
