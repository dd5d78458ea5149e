use std::sync::Arc;

use arbor_history::{LinearHistory, Version};
use arbor_merge::{MergeConfig, MergeOutcome, VersionMerger};
use arbor_ops::WriteView;
use arbor_store::ObjectStore;
use arbor_tree::{Tree, TreeResult};
use arbor_types::{IdGenerator, NodeId, ObjectId, TreeId};
use tracing::{debug, info};

use crate::error::SdkResult;

/// One participant's view of a versioned tree.
///
/// Replicas share an object store but each has its own id generator and
/// head. Editing moves the head forward; merging another replica's head
/// reconciles the two histories.
pub struct Replica {
    store: Arc<dyn ObjectStore>,
    ids: Arc<dyn IdGenerator>,
    merger: VersionMerger,
    head: Version,
    author: Option<String>,
}

impl Replica {
    /// Create a new repository with an empty tree.
    pub fn init(
        store: Arc<dyn ObjectStore>,
        ids: Arc<dyn IdGenerator>,
        tree_id: TreeId,
        uses_role_ids: bool,
    ) -> SdkResult<Self> {
        let tree = Tree::new(Arc::clone(&store), tree_id, uses_role_ids)?;
        let head = Version::create_initial(ids.generate()?, &tree, None)?;
        info!(tree = %tree.id(), head = %head.hash().short_hex(), "replica initialized");
        Ok(Self::with_head(store, ids, head))
    }

    /// Open an existing version as the head.
    pub fn open(store: Arc<dyn ObjectStore>, ids: Arc<dyn IdGenerator>, head: &ObjectId) -> SdkResult<Self> {
        let head = Version::load_from_hash(head, Arc::clone(&store))?;
        debug!(head = %head.hash().short_hex(), "replica opened");
        Ok(Self::with_head(store, ids, head))
    }

    /// A second replica of the same repository, starting at this head.
    pub fn fork(&self, ids: Arc<dyn IdGenerator>) -> Self {
        Self::with_head(Arc::clone(&self.store), ids, self.head.clone())
            .with_merge_config(self.merger.config().clone())
    }

    fn with_head(store: Arc<dyn ObjectStore>, ids: Arc<dyn IdGenerator>, head: Version) -> Self {
        let merger = VersionMerger::new(Arc::clone(&store), Arc::clone(&ids), MergeConfig::default());
        Self {
            store,
            ids,
            merger,
            head,
            author: None,
        }
    }

    /// Record `author` on versions committed from now on.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_merge_config(mut self, config: MergeConfig) -> Self {
        self.merger = VersionMerger::new(Arc::clone(&self.store), Arc::clone(&self.ids), config);
        self
    }

    pub fn head(&self) -> &Version {
        &self.head
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The tree at the head.
    pub fn tree(&self) -> SdkResult<Tree> {
        Ok(self.head.tree()?)
    }

    /// A fresh node id for this replica.
    pub fn new_node_id(&self) -> SdkResult<NodeId> {
        Ok(self.ids.generate()?)
    }

    /// Run `f` against the head tree and commit what it did.
    ///
    /// Returns the new version, or `None` when `f` applied no operations.
    /// If `f` fails nothing is committed and the head is unchanged.
    pub fn edit<F>(&mut self, f: F) -> SdkResult<Option<Version>>
    where
        F: FnOnce(&mut WriteView) -> TreeResult<()>,
    {
        let mut view = WriteView::new(self.head.tree()?);
        f(&mut view)?;
        let (tree, operations) = view.finish();
        if operations.is_empty() {
            return Ok(None);
        }
        let version = Version::create_regular(
            self.ids.generate()?,
            &tree,
            &self.head,
            operations,
            self.author.clone(),
        )?;
        debug!(version = %version.summary(), "edit committed");
        self.head = version.clone();
        Ok(Some(version))
    }

    /// Merge `other` into the head. The head becomes the merge result.
    pub fn merge(&mut self, other: &Version) -> SdkResult<MergeOutcome> {
        let outcome = self.merger.merge_outcome(&self.head, other)?;
        info!(
            outcome = outcome.name(),
            head = %outcome.version().hash().short_hex(),
            "merged into replica"
        );
        self.head = outcome.version().clone();
        Ok(outcome)
    }

    /// Every version reachable from the head, oldest first.
    pub fn log(&self) -> SdkResult<Vec<Version>> {
        Ok(LinearHistory::new(None).load(&[&self.head])?)
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("head", &self.head)
            .field("author", &self.author)
            .finish()
    }
}
