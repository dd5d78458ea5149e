//! Linearization of the versions between an ancestor and some tips.

use std::collections::{HashSet, VecDeque};

use arbor_types::ObjectId;
use tracing::debug;

use crate::error::HistoryResult;
use crate::version::Version;

/// Lists the versions that are reachable from some tips but not from an
/// ancestor, parents before children.
#[derive(Clone, Debug, Default)]
pub struct LinearHistory {
    ancestor: Option<Version>,
}

impl LinearHistory {
    /// `None` means there is no shared ancestor and everything reachable
    /// from the tips is listed.
    pub fn new(ancestor: Option<&Version>) -> Self {
        Self {
            ancestor: ancestor.cloned(),
        }
    }

    /// Versions between the ancestor (exclusive) and each tip (inclusive).
    ///
    /// Each tip's versions are listed in causal order, first parents
    /// before second parents, and the lists are concatenated in the order
    /// of `tips`. A version reachable from several tips is listed once, for
    /// the first tip that reaches it. Merge versions are listed like any
    /// other; callers that replay operations skip them, since their
    /// parents are listed too.
    pub fn load(&self, tips: &[&Version]) -> HistoryResult<Vec<Version>> {
        let mut seen = match &self.ancestor {
            Some(ancestor) => reachable(ancestor)?,
            None => HashSet::new(),
        };
        let excluded = seen.len();
        let mut result = Vec::new();
        for tip in tips {
            // Iterative post-order so long histories cannot overflow the stack.
            let mut stack = vec![((*tip).clone(), false)];
            while let Some((version, expanded)) = stack.pop() {
                if expanded {
                    result.push(version);
                    continue;
                }
                if !seen.insert(version.hash()) {
                    continue;
                }
                let parents = version.parents()?;
                stack.push((version, true));
                for parent in parents.into_iter().rev() {
                    if !seen.contains(&parent.hash()) {
                        stack.push((parent, false));
                    }
                }
            }
        }
        debug!(
            tips = tips.len(),
            excluded,
            versions = result.len(),
            "history linearized"
        );
        Ok(result)
    }
}

/// Every version reachable from `start`, including itself.
fn reachable(start: &Version) -> HistoryResult<HashSet<ObjectId>> {
    let mut visited = HashSet::from([start.hash()]);
    let mut queue = VecDeque::from([start.clone()]);
    while let Some(version) = queue.pop_front() {
        for parent in version.parents()? {
            if visited.insert(parent.hash()) {
                queue.push_back(parent);
            }
        }
    }
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::{commit, merge, root_version};

    fn ids(versions: &[Version]) -> Vec<u64> {
        versions.iter().map(Version::id).collect()
    }

    #[test]
    fn single_branch_is_causal_and_ancestor_exclusive() {
        let base = root_version("t");
        let a = commit(&base, 10);
        let b = commit(&a, 11);
        let c = commit(&b, 12);
        let history = LinearHistory::new(Some(&a)).load(&[&c]).unwrap();
        assert_eq!(ids(&history), vec![11, 12]);
    }

    #[test]
    fn two_tips_are_concatenated_in_order() {
        let base = root_version("t");
        let left = commit(&commit(&base, 10), 11);
        let right = commit(&base, 20);
        let linear = LinearHistory::new(Some(&base));
        assert_eq!(ids(&linear.load(&[&left, &right]).unwrap()), vec![10, 11, 20]);
        assert_eq!(ids(&linear.load(&[&right, &left]).unwrap()), vec![20, 10, 11]);
    }

    #[test]
    fn tip_equal_to_ancestor_contributes_nothing() {
        let base = root_version("t");
        let tip = commit(&base, 10);
        assert!(LinearHistory::new(Some(&tip)).load(&[&tip]).unwrap().is_empty());
    }

    #[test]
    fn shared_versions_listed_once_and_merges_after_parents() {
        let base = root_version("t");
        let x = commit(&base, 10);
        let y = commit(&base, 20);
        let m = merge(&base, &x, &y);
        let after = commit(&m, 30);
        let other = commit(&y, 40);

        let history = LinearHistory::new(Some(&base)).load(&[&after, &other]).unwrap();
        assert_eq!(ids(&history), vec![10, 20, m.id(), 30, 40]);
        assert_eq!(history.iter().filter(|v| v.is_merge()).count(), 1);
    }

    #[test]
    fn no_ancestor_lists_everything() {
        let base = root_version("t");
        let tip = commit(&base, 10);
        let history = LinearHistory::new(None).load(&[&tip]).unwrap();
        assert_eq!(ids(&history), vec![1, 10]);
    }
}
