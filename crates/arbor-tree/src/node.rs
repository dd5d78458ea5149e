//! Persisted node records.

use std::collections::BTreeMap;

use arbor_store::{ObjectKind, Record};
use arbor_types::{ConceptReference, NodeId, NodeReference, ROOT_ID};
use serde::{Deserialize, Serialize};

/// The ordered children of one containment role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLink {
    /// Role name, `None` for the default role.
    pub role: Option<String>,
    /// Child ids in insertion/move order.
    pub ids: Vec<NodeId>,
}

/// A single node as stored in the object store.
///
/// The record is canonical: properties and references are role-sorted maps,
/// child links are sorted by role and never empty. Two nodes with the same
/// content therefore serialize to the same bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<ConceptReference>,
    /// Parent id, `0` for the root.
    pub parent: NodeId,
    /// Containment role in the parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, NodeReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildLink>,
}

impl Record for NodeData {
    const KIND: ObjectKind = ObjectKind::Node;
}

impl NodeData {
    pub fn new(
        id: NodeId,
        concept: Option<ConceptReference>,
        parent: NodeId,
        role: Option<String>,
    ) -> Self {
        Self {
            id,
            concept,
            parent,
            role,
            properties: BTreeMap::new(),
            references: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// The record of a fresh root node.
    pub fn root() -> Self {
        Self::new(ROOT_ID, None, 0, None)
    }

    /// The parent id, or `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        (self.parent != 0).then_some(self.parent)
    }

    fn link_index(&self, role: Option<&str>) -> Result<usize, usize> {
        self.children
            .binary_search_by(|link| link.role.as_deref().cmp(&role))
    }

    /// Children in one role, in order.
    pub fn children_in(&self, role: Option<&str>) -> &[NodeId] {
        match self.link_index(role) {
            Ok(i) => &self.children[i].ids,
            Err(_) => &[],
        }
    }

    /// All children, grouped by role in role order.
    pub fn all_children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().flat_map(|link| link.ids.iter().copied())
    }

    /// Roles that currently hold at least one child.
    pub fn child_roles(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.children.iter().map(|link| link.role.as_deref())
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Role and index of a direct child.
    pub fn position_of(&self, child: NodeId) -> Option<(Option<&str>, usize)> {
        self.children.iter().find_map(|link| {
            link.ids
                .iter()
                .position(|id| *id == child)
                .map(|i| (link.role.as_deref(), i))
        })
    }

    /// Insert `ids` at `position` of `role`. The caller has validated
    /// `position <= children_in(role).len()`.
    pub(crate) fn insert_children(&mut self, role: Option<&str>, position: usize, ids: &[NodeId]) {
        let i = match self.link_index(role) {
            Ok(i) => i,
            Err(i) => {
                self.children.insert(
                    i,
                    ChildLink {
                        role: role.map(str::to_owned),
                        ids: Vec::new(),
                    },
                );
                i
            }
        };
        let link = &mut self.children[i].ids;
        link.splice(position..position, ids.iter().copied());
    }

    /// Unlink a direct child. Returns `false` if it was not a child.
    pub(crate) fn remove_child(&mut self, child: NodeId) -> bool {
        for i in 0..self.children.len() {
            if let Some(pos) = self.children[i].ids.iter().position(|id| *id == child) {
                self.children[i].ids.remove(pos);
                if self.children[i].ids.is_empty() {
                    self.children.remove(i);
                }
                return true;
            }
        }
        false
    }
}
