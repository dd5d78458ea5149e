//! The merge state machine.

use std::sync::Arc;

use arbor_history::{merge_bases, LinearHistory, Version};
use arbor_ops::{OperationIntent, WriteView};
use arbor_store::ObjectStore;
use arbor_tree::{Tree, TreeError};
use arbor_types::IdGenerator;
use tracing::{debug, info, trace};

use crate::config::{BranchOrder, MergeConfig};
use crate::error::{MergeError, MergeResult};

/// How a merge was resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Both inputs were the same version.
    Identical(Version),
    /// One input already contained the other; this is the descendant.
    FastForward(Version),
    /// A new merge version.
    Merged(Version),
}

impl MergeOutcome {
    pub fn version(&self) -> &Version {
        match self {
            Self::Identical(v) | Self::FastForward(v) | Self::Merged(v) => v,
        }
    }

    pub fn into_version(self) -> Version {
        match self {
            Self::Identical(v) | Self::FastForward(v) | Self::Merged(v) => v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identical(_) => "identical",
            Self::FastForward(_) => "fast-forward",
            Self::Merged(_) => "merged",
        }
    }
}

/// Reconciles diverged versions by replaying operation intents.
///
/// A merger holds no per-merge state; concurrent merges on one merger are
/// fine as long as each works on its own inputs.
pub struct VersionMerger {
    store: Arc<dyn ObjectStore>,
    ids: Arc<dyn IdGenerator>,
    config: MergeConfig,
}

impl VersionMerger {
    pub fn new(store: Arc<dyn ObjectStore>, ids: Arc<dyn IdGenerator>, config: MergeConfig) -> Self {
        Self { store, ids, config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge two versions and return the resulting version.
    pub fn merge(&self, left: &Version, right: &Version) -> MergeResult<Version> {
        Ok(self.merge_outcome(left, right)?.into_version())
    }

    /// Merge two versions and report how the merge was resolved.
    pub fn merge_outcome(&self, left: &Version, right: &Version) -> MergeResult<MergeOutcome> {
        if left.hash() == right.hash() {
            info!(version = %left.hash().short_hex(), "merge: identical versions");
            return Ok(MergeOutcome::Identical(left.clone()));
        }

        let left_tree = left.tree()?;
        let right_tree = right.tree()?;
        if left_tree.id() != right_tree.id() {
            return Err(MergeError::RepositoryMismatch {
                left: left_tree.id().clone(),
                right: right_tree.id().clone(),
            });
        }

        let bases = merge_bases(left, right)?;
        if let Some(descendant) = fast_forward(left, right, &bases) {
            info!(version = %descendant.hash().short_hex(), "merge: fast-forward");
            return Ok(MergeOutcome::FastForward(descendant));
        }

        let ancestor = self.merge_base(bases)?;
        let merged = self.three_way(left, right, ancestor.as_ref(), &left_tree)?;
        info!(
            version = %merged.hash().short_hex(),
            tree = %merged.tree_hash().short_hex(),
            "merge: new merge version"
        );
        Ok(MergeOutcome::Merged(merged))
    }

    /// One version standing for all merge bases.
    ///
    /// Several bases come from criss-cross merges. They are merged with each
    /// other first, so the replay starts from the content both tips already
    /// settled on and only replays what lies above every base.
    fn merge_base(&self, bases: Vec<Version>) -> MergeResult<Option<Version>> {
        let mut bases = bases.into_iter();
        let Some(mut base) = bases.next() else {
            return Ok(None);
        };
        for next in bases {
            debug!(
                left = %base.hash().short_hex(),
                right = %next.hash().short_hex(),
                "merging criss-cross bases"
            );
            base = self.merge_outcome(&base, &next)?.into_version();
        }
        Ok(Some(base))
    }

    fn replay_order<'v>(&self, left: &'v Version, right: &'v Version) -> [&'v Version; 2] {
        match self.config.branch_order {
            BranchOrder::LeftFirst => [left, right],
            BranchOrder::ByTipHash if left.hash() <= right.hash() => [left, right],
            BranchOrder::ByTipHash => [right, left],
        }
    }

    fn three_way(
        &self,
        left: &Version,
        right: &Version,
        ancestor: Option<&Version>,
        template: &Tree,
    ) -> MergeResult<Version> {
        let base_tree = match ancestor {
            Some(ancestor) => ancestor.tree()?,
            None => Tree::new(
                Arc::clone(&self.store),
                template.id().clone(),
                template.uses_role_ids(),
            )?,
        };

        let order = self.replay_order(left, right);
        let history = LinearHistory::new(ancestor).load(&order)?;
        let mut intents = Vec::new();
        let mut originals = Vec::new();
        for version in history.iter().filter(|v| !v.is_merge()) {
            intents.extend(self.capture(version)?);
            originals.extend(version.operations().iter().cloned());
        }
        debug!(
            ancestor = ?ancestor.map(|a| a.hash().short_hex()),
            versions = history.len(),
            operations = intents.len(),
            "replaying captured intents"
        );

        let mut view = WriteView::new(base_tree);
        for intent in &intents {
            let restored = intent.restore(view.tree()).map_err(|source| MergeError::Restore {
                op: intent.original().clone(),
                source,
            })?;
            for op in restored {
                let transformed = op.clone();
                view.apply(op).map_err(|source| MergeError::Apply {
                    op: intent.original().clone(),
                    transformed,
                    source,
                })?;
            }
        }
        let (tree, applied) = view.finish();
        trace!(
            original = originals.len(),
            applied = applied.len(),
            "replay finished"
        );

        Ok(Version::create_auto_merge(
            self.ids.generate()?,
            &tree,
            ancestor,
            left,
            right,
            originals,
            Arc::clone(&self.store),
        )?)
    }

    /// Intents of a version's operations, each captured against the tree
    /// as it stood when that operation was applied.
    fn capture(&self, version: &Version) -> MergeResult<Vec<OperationIntent>> {
        let base_tree = match version.base_version()? {
            Some(base) => base.tree()?,
            None => {
                let own = version.tree()?;
                Tree::new(Arc::clone(&self.store), own.id().clone(), own.uses_role_ids())?
            }
        };
        let mut view = WriteView::new(base_tree);
        let mut intents = Vec::with_capacity(version.operations().len());
        for op in version.operations() {
            let wrap = |source: TreeError| MergeError::Capture {
                op: op.clone(),
                source,
            };
            intents.push(op.capture_intent(view.tree()).map_err(wrap)?);
            view.apply(op.clone()).map_err(wrap)?;
        }
        Ok(intents)
    }
}

/// The descendant, if the only merge base is one of the tips.
fn fast_forward(left: &Version, right: &Version, bases: &[Version]) -> Option<Version> {
    match bases {
        [base] if base.hash() == left.hash() => Some(right.clone()),
        [base] if base.hash() == right.hash() => Some(left.clone()),
        _ => None,
    }
}

impl std::fmt::Debug for VersionMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionMerger")
            .field("config", &self.config)
            .finish()
    }
}
