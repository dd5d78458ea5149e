//! Ancestry queries over the version DAG.

use std::collections::{HashMap, HashSet, VecDeque};

use arbor_types::ObjectId;
use tracing::trace;

use crate::error::HistoryResult;
use crate::version::Version;

/// The merge bases of `a` and `b`: every common ancestor that is not itself
/// an ancestor of another common ancestor, ordered by hash.
///
/// The result does not depend on the argument order. Both sides are walked
/// breadth-first one level per round until they meet. While neither walk
/// has passed through a merge version each side is a single chain, the
/// nearest meeting version is the only base, and the cost is bounded by the
/// distance to it. Once a merge version has been walked, several bases are
/// possible, so the full ancestry of both tips is compared instead.
///
/// A single base equal to one of the tips means that tip is an ancestor of
/// the other. An empty result means the histories share no version.
pub fn merge_bases(a: &Version, b: &Version) -> HistoryResult<Vec<Version>> {
    if a.hash() == b.hash() {
        return Ok(vec![a.clone()]);
    }
    let mut side_a = Side::new(a);
    let mut side_b = Side::new(b);
    let mut rounds = 0usize;
    loop {
        let nearest = side_a
            .visited
            .iter()
            .filter(|(hash, _)| side_b.visited.contains_key(*hash))
            .min_by_key(|(hash, (depth, _))| (*depth, **hash))
            .map(|(_, (_, version))| version.clone());
        if let Some(nearest) = nearest {
            if !side_a.walked_merge && !side_b.walked_merge {
                trace!(rounds, base = %nearest.hash().short_hex(), "merge base found");
                return Ok(vec![nearest]);
            }
            break;
        }
        if side_a.frontier.is_empty() && side_b.frontier.is_empty() {
            trace!(rounds, "histories are disjoint");
            return Ok(Vec::new());
        }
        rounds += 1;
        side_a.step()?;
        side_b.step()?;
    }

    let from_a = ancestry(a)?;
    let from_b = ancestry(b)?;
    let common: Vec<&Version> = from_a
        .iter()
        .filter(|(hash, _)| from_b.contains_key(*hash))
        .map(|(_, version)| version)
        .collect();
    // Common ancestry is closed under parents, so a common version is a
    // base exactly when no common version lists it as a parent.
    let covered: HashSet<ObjectId> = common.iter().flat_map(|v| v.parent_hashes()).collect();
    let mut bases: Vec<Version> = common
        .into_iter()
        .filter(|v| !covered.contains(&v.hash()))
        .cloned()
        .collect();
    bases.sort_by_key(Version::hash);
    trace!(rounds, bases = bases.len(), "merge bases from full ancestry");
    Ok(bases)
}

/// The nearest version reachable from both `a` and `b`, or `None` when the
/// histories share no version.
///
/// With several merge bases this is the one with the smallest hash, see
/// [`merge_bases`].
pub fn common_ancestor(a: &Version, b: &Version) -> HistoryResult<Option<Version>> {
    Ok(merge_bases(a, b)?.into_iter().next())
}

struct Side {
    /// Depth from the tip and the version, per visited hash.
    visited: HashMap<ObjectId, (usize, Version)>,
    frontier: Vec<Version>,
    depth: usize,
    walked_merge: bool,
}

impl Side {
    fn new(start: &Version) -> Self {
        Self {
            visited: HashMap::from([(start.hash(), (0, start.clone()))]),
            frontier: vec![start.clone()],
            depth: 0,
            walked_merge: false,
        }
    }

    /// Expand the frontier by one level.
    fn step(&mut self) -> HistoryResult<()> {
        self.depth += 1;
        // Hint the whole level first so a caching store loads it in one trip.
        for version in &self.frontier {
            for hash in version.parent_hashes() {
                if !self.visited.contains_key(&hash) {
                    version.store().prefetch(&hash);
                }
            }
        }
        let mut next = Vec::new();
        for version in std::mem::take(&mut self.frontier) {
            let parents = version.parents()?;
            self.walked_merge |= parents.len() > 1;
            for parent in parents {
                if !self.visited.contains_key(&parent.hash()) {
                    self.visited.insert(parent.hash(), (self.depth, parent.clone()));
                    next.push(parent);
                }
            }
        }
        self.frontier = next;
        Ok(())
    }
}

/// Every version reachable from `start`, including itself.
fn ancestry(start: &Version) -> HistoryResult<HashMap<ObjectId, Version>> {
    let mut visited = HashMap::from([(start.hash(), start.clone())]);
    let mut queue = VecDeque::from([start.clone()]);
    while let Some(version) = queue.pop_front() {
        for parent in version.parents()? {
            if !visited.contains_key(&parent.hash()) {
                visited.insert(parent.hash(), parent.clone());
                queue.push_back(parent);
            }
        }
    }
    Ok(visited)
}

/// Whether `ancestor` is reachable from `descendant` (or equal to it).
pub fn is_ancestor(ancestor: &Version, descendant: &Version) -> HistoryResult<bool> {
    let target = ancestor.hash();
    let mut visited = HashSet::from([descendant.hash()]);
    let mut queue = VecDeque::from([descendant.clone()]);
    while let Some(version) = queue.pop_front() {
        if version.hash() == target {
            return Ok(true);
        }
        for parent in version.parents()? {
            if visited.insert(parent.hash()) {
                queue.push_back(parent);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use arbor_ops::WriteView;
    use arbor_store::{InMemoryObjectStore, ObjectStore};
    use arbor_tree::{Tree, APPEND};
    use arbor_types::{TreeId, ROOT_ID};
    use std::sync::Arc;

    pub(crate) fn root_version(name: &str) -> Version {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let tree = Tree::new(store, TreeId::new(name), false).unwrap();
        Version::create_initial(1, &tree, None).unwrap()
    }

    pub(crate) fn commit(base: &Version, child: u64) -> Version {
        let mut view = WriteView::new(base.tree().unwrap());
        view.add_new_child(ROOT_ID, Some("items"), APPEND, child, None).unwrap();
        let (tree, ops) = view.finish();
        Version::create_regular(child, &tree, base, ops, None).unwrap()
    }

    pub(crate) fn merge(ancestor: &Version, left: &Version, right: &Version) -> Version {
        let tree = left.tree().unwrap();
        Version::create_auto_merge(
            left.id() * 1000 + right.id(),
            &tree,
            Some(ancestor),
            left,
            right,
            Vec::new(),
            Arc::clone(left.store()),
        )
        .unwrap()
    }

    #[test]
    fn identical_versions() {
        let v = root_version("t");
        assert_eq!(common_ancestor(&v, &v).unwrap(), Some(v));
    }

    #[test]
    fn diverged_branches_meet_at_fork() {
        let base = root_version("t");
        let fork = commit(&base, 10);
        let left = commit(&commit(&fork, 11), 12);
        let right = commit(&fork, 13);
        assert_eq!(common_ancestor(&left, &right).unwrap(), Some(fork.clone()));
        assert_eq!(common_ancestor(&right, &left).unwrap(), Some(fork));
    }

    #[test]
    fn ancestor_of_the_other_tip() {
        let base = root_version("t");
        let tip = commit(&commit(&commit(&base, 10), 11), 12);
        assert_eq!(common_ancestor(&base, &tip).unwrap(), Some(base.clone()));
        assert_eq!(common_ancestor(&tip, &base).unwrap(), Some(base.clone()));
        assert!(is_ancestor(&base, &tip).unwrap());
        assert!(!is_ancestor(&tip, &base).unwrap());
        assert!(is_ancestor(&tip, &tip).unwrap());
    }

    #[test]
    fn disjoint_histories() {
        let a = commit(&root_version("a"), 10);
        // Same store, unrelated root.
        let other_tree = Tree::new(Arc::clone(a.store()), TreeId::new("b"), false).unwrap();
        let b = commit(&Version::create_initial(7, &other_tree, None).unwrap(), 20);
        assert_eq!(common_ancestor(&a, &b).unwrap(), None);
        assert!(!is_ancestor(&a, &b).unwrap());
    }

    #[test]
    fn walks_through_merges() {
        let base = root_version("t");
        let left = commit(&base, 10);
        let right = commit(&base, 11);
        let merged = merge(&base, &left, &right);
        let after = commit(&merged, 12);
        let other = commit(&right, 13);
        assert_eq!(common_ancestor(&after, &other).unwrap(), Some(right));
    }

    #[test]
    fn criss_cross_has_two_bases() {
        let base = root_version("t");
        let a1 = commit(&base, 10);
        let b1 = commit(&base, 20);
        let a2 = commit(&merge(&base, &a1, &b1), 11);
        let b2 = commit(&merge(&base, &b1, &a1), 21);

        let mut expected = vec![a1, b1];
        expected.sort_by_key(Version::hash);
        assert_eq!(merge_bases(&a2, &b2).unwrap(), expected);
        assert_eq!(merge_bases(&b2, &a2).unwrap(), expected);
        assert_eq!(common_ancestor(&a2, &b2).unwrap(), common_ancestor(&b2, &a2).unwrap());
    }

    #[test]
    fn tip_found_behind_shorter_path() {
        // `merged` reaches the root in two steps but `tip` only in four.
        let base = root_version("t");
        let tip = commit(&base, 10);
        let long = commit(&commit(&tip, 11), 12);
        let short = commit(&base, 20);
        let merged = merge(&base, &short, &long);

        assert_eq!(merge_bases(&tip, &merged).unwrap(), vec![tip.clone()]);
        assert_eq!(merge_bases(&merged, &tip).unwrap(), vec![tip.clone()]);
        assert!(is_ancestor(&tip, &merged).unwrap());
    }

    #[test]
    fn chains_return_one_base() {
        let base = root_version("t");
        let fork = commit(&commit(&base, 10), 11);
        let left = commit(&fork, 12);
        let right = commit(&commit(&commit(&fork, 13), 14), 15);
        assert_eq!(merge_bases(&left, &right).unwrap(), vec![fork.clone()]);
        assert_eq!(merge_bases(&right, &left).unwrap(), vec![fork]);
    }
}
