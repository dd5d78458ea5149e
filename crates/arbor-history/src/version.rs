//! Version records and handles.

use std::sync::Arc;

use arbor_ops::Operation;
use arbor_store::{ObjectKind, ObjectStore, Record};
use arbor_tree::Tree;
use arbor_types::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HistoryError, HistoryResult};

/// How a version was derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lineage {
    /// First version of a tree.
    Initial,
    /// Ordinary edit on top of `base`.
    Regular { base: ObjectId },
    /// Merge of two tips. `ancestor` is the common ancestor used, `None`
    /// when the histories were disjoint.
    Merge {
        ancestor: Option<ObjectId>,
        left: ObjectId,
        right: ObjectId,
    },
}

/// The persisted record of a version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    /// Client-generated id, unique per replica.
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Hash of the tree snapshot this version names.
    pub tree: ObjectId,
    pub lineage: Lineage,
    /// Operations that turn the parent tree into `tree`. For merges, the
    /// original operations of both branches.
    pub operations: Vec<Operation>,
}

impl Record for VersionData {
    const KIND: ObjectKind = ObjectKind::Version;
}

/// An immutable, content-addressed commit.
///
/// Cheap to clone: the record is shared behind an `Arc`.
#[derive(Clone)]
pub struct Version {
    hash: ObjectId,
    data: Arc<VersionData>,
    store: Arc<dyn ObjectStore>,
}

impl Version {
    /// Persist a version record.
    pub fn create(store: Arc<dyn ObjectStore>, data: VersionData) -> HistoryResult<Self> {
        let hash = store.put(&data.to_stored_object()?)?;
        debug!(
            version = %hash.short_hex(),
            tree = %data.tree.short_hex(),
            operations = data.operations.len(),
            "version created"
        );
        Ok(Self {
            hash,
            data: Arc::new(data),
            store,
        })
    }

    /// The first version of `tree`.
    pub fn create_initial(id: u64, tree: &Tree, author: Option<String>) -> HistoryResult<Self> {
        Self::create(
            Arc::clone(tree.store()),
            VersionData {
                id,
                author,
                time: Some(Utc::now()),
                tree: tree.hash(),
                lineage: Lineage::Initial,
                operations: Vec::new(),
            },
        )
    }

    /// A version produced by applying `operations` to `base`'s tree.
    pub fn create_regular(
        id: u64,
        tree: &Tree,
        base: &Version,
        operations: Vec<Operation>,
        author: Option<String>,
    ) -> HistoryResult<Self> {
        Self::create(
            Arc::clone(tree.store()),
            VersionData {
                id,
                author,
                time: Some(Utc::now()),
                tree: tree.hash(),
                lineage: Lineage::Regular { base: base.hash },
                operations,
            },
        )
    }

    /// A merge of `left` and `right`.
    pub fn create_auto_merge(
        id: u64,
        tree: &Tree,
        ancestor: Option<&Version>,
        left: &Version,
        right: &Version,
        operations: Vec<Operation>,
        store: Arc<dyn ObjectStore>,
    ) -> HistoryResult<Self> {
        Self::create(
            store,
            VersionData {
                id,
                author: None,
                time: Some(Utc::now()),
                tree: tree.hash(),
                lineage: Lineage::Merge {
                    ancestor: ancestor.map(Version::hash),
                    left: left.hash,
                    right: right.hash,
                },
                operations,
            },
        )
    }

    /// Resolve a persisted version.
    pub fn load_from_hash(hash: &ObjectId, store: Arc<dyn ObjectStore>) -> HistoryResult<Self> {
        let data = VersionData::from_stored_object(&store.get_required(hash)?)?;
        Ok(Self {
            hash: *hash,
            data: Arc::new(data),
            store,
        })
    }

    pub fn hash(&self) -> ObjectId {
        self.hash
    }

    pub fn id(&self) -> u64 {
        self.data.id
    }

    pub fn author(&self) -> Option<&str> {
        self.data.author.as_deref()
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.data.time
    }

    pub fn data(&self) -> &VersionData {
        &self.data
    }

    pub fn lineage(&self) -> &Lineage {
        &self.data.lineage
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Hash of the tree this version names.
    pub fn tree_hash(&self) -> ObjectId {
        self.data.tree
    }

    /// Load the tree this version names.
    pub fn tree(&self) -> HistoryResult<Tree> {
        Tree::load(Arc::clone(&self.store), &self.data.tree).map_err(|source| HistoryError::BrokenTree {
            version: self.hash,
            tree: self.data.tree,
            source,
        })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.data.operations
    }

    pub fn is_merge(&self) -> bool {
        matches!(self.data.lineage, Lineage::Merge { .. })
    }

    /// Parent hashes: none, the base, or left then right.
    pub fn parent_hashes(&self) -> Vec<ObjectId> {
        match &self.data.lineage {
            Lineage::Initial => Vec::new(),
            Lineage::Regular { base } => vec![*base],
            Lineage::Merge { left, right, .. } => vec![*left, *right],
        }
    }

    /// Load the parent versions.
    pub fn parents(&self) -> HistoryResult<Vec<Version>> {
        self.parent_hashes()
            .iter()
            .map(|hash| Version::load_from_hash(hash, Arc::clone(&self.store)))
            .collect()
    }

    /// The base of a regular version.
    pub fn base_version(&self) -> HistoryResult<Option<Version>> {
        match &self.data.lineage {
            Lineage::Regular { base } => Ok(Some(Version::load_from_hash(base, Arc::clone(&self.store))?)),
            _ => Ok(None),
        }
    }

    /// The common ancestor recorded on a merge version.
    pub fn merge_ancestor(&self) -> HistoryResult<Option<Version>> {
        match &self.data.lineage {
            Lineage::Merge {
                ancestor: Some(ancestor),
                ..
            } => Ok(Some(Version::load_from_hash(ancestor, Arc::clone(&self.store))?)),
            _ => Ok(None),
        }
    }

    /// One-line description for logs and the CLI.
    pub fn summary(&self) -> String {
        let kind = match self.data.lineage {
            Lineage::Initial => "initial",
            Lineage::Regular { .. } => "regular",
            Lineage::Merge { .. } => "merge",
        };
        format!(
            "{} {kind} ({} ops, tree {})",
            self.hash.short_hex(),
            self.data.operations.len(),
            self.data.tree.short_hex()
        )
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Version {}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Version")
            .field("hash", &self.hash)
            .field("lineage", &self.data.lineage)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_ops::WriteView;
    use arbor_store::{InMemoryObjectStore, StoreError};
    use arbor_tree::APPEND;
    use arbor_types::{TreeId, ROOT_ID};

    fn initial() -> Version {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let tree = Tree::new(store, TreeId::new("history"), false).unwrap();
        Version::create_initial(1, &tree, Some("alice".into())).unwrap()
    }

    fn edit(base: &Version, id: u64, child: u64) -> Version {
        let mut view = WriteView::new(base.tree().unwrap());
        view.add_new_child(ROOT_ID, Some("items"), APPEND, child, None).unwrap();
        let (tree, ops) = view.finish();
        Version::create_regular(id, &tree, base, ops, None).unwrap()
    }

    #[test]
    fn initial_version_has_no_parents() {
        let v = initial();
        assert!(v.parent_hashes().is_empty());
        assert!(v.base_version().unwrap().is_none());
        assert!(!v.is_merge());
        assert_eq!(v.author(), Some("alice"));
        assert!(v.time().is_some());
        assert_eq!(v.tree().unwrap().node_count().unwrap(), 1);
    }

    #[test]
    fn regular_version_links_base() {
        let v0 = initial();
        let v1 = edit(&v0, 2, 10);
        assert_eq!(v1.base_version().unwrap(), Some(v0.clone()));
        assert_eq!(v1.parents().unwrap(), vec![v0]);
        assert_eq!(v1.operations().len(), 1);
    }

    #[test]
    fn load_from_hash_roundtrip() {
        let v0 = initial();
        let v1 = edit(&v0, 2, 10);
        let loaded = Version::load_from_hash(&v1.hash(), Arc::clone(v1.store())).unwrap();
        assert_eq!(loaded, v1);
        assert_eq!(loaded.data(), v1.data());
        assert_eq!(loaded.tree().unwrap().hash(), v1.tree().unwrap().hash());
        assert_eq!(loaded.parent_hashes(), v1.parent_hashes());
    }

    #[test]
    fn auto_merge_records_both_tips_and_ancestor() {
        let v0 = initial();
        let left = edit(&v0, 2, 10);
        let right = edit(&v0, 3, 11);
        let tree = left.tree().unwrap();
        let merge = Version::create_auto_merge(
            4,
            &tree,
            Some(&v0),
            &left,
            &right,
            Vec::new(),
            Arc::clone(v0.store()),
        )
        .unwrap();
        assert!(merge.is_merge());
        assert_eq!(merge.parent_hashes(), vec![left.hash(), right.hash()]);
        assert_eq!(merge.merge_ancestor().unwrap(), Some(v0));
        assert!(merge.base_version().unwrap().is_none());
        assert!(merge.summary().contains("merge"));
    }

    #[test]
    fn loading_unknown_hash_is_integrity_error() {
        let v0 = initial();
        let missing = ObjectId::from_bytes(b"nope");
        assert!(matches!(
            Version::load_from_hash(&missing, Arc::clone(v0.store())),
            Err(HistoryError::Store(StoreError::MissingObject(_)))
        ));
    }

    #[test]
    fn lineage_serde_is_tagged() {
        let base = ObjectId::from_bytes(b"base");
        let record = VersionData {
            id: 9,
            author: None,
            time: None,
            tree: ObjectId::from_bytes(b"tree"),
            lineage: Lineage::Regular { base },
            operations: vec![Operation::DeleteNode { node: 3 }],
        };
        let stored = record.to_stored_object().unwrap();
        let text = String::from_utf8(stored.data.clone()).unwrap();
        assert!(text.contains(r#""kind":"regular""#));
        assert_eq!(VersionData::from_stored_object(&stored).unwrap(), record);
    }
}
