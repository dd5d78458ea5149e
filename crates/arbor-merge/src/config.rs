use serde::{Deserialize, Serialize};

/// Which branch's operations are replayed first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchOrder {
    /// The branch whose tip has the smaller hash goes first, so the merged
    /// tree does not depend on which side was passed as `left`.
    #[default]
    ByTipHash,
    /// Always replay the left branch first.
    LeftFirst,
}

/// Configuration for [`VersionMerger`](crate::VersionMerger).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub branch_order: BranchOrder,
}

impl MergeConfig {
    /// Replay left before right regardless of tip hashes.
    pub fn left_first() -> Self {
        Self {
            branch_order: BranchOrder::LeftFirst,
        }
    }
}
