//! Error types for merging.

use arbor_history::HistoryError;
use arbor_ops::Operation;
use arbor_tree::TreeError;
use arbor_types::{TreeId, TypeError};

/// Errors that abort a merge. A failed merge never produces a version.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The two versions belong to different repositories.
    #[error("cannot merge unrelated trees {left} and {right}")]
    RepositoryMismatch { left: TreeId, right: TreeId },

    /// Capturing the intent of an operation against its own base failed.
    #[error("capturing `{op}` failed: {source}")]
    Capture {
        op: Operation,
        #[source]
        source: TreeError,
    },

    /// Restoring an intent against the merge tree failed.
    #[error("restoring `{op}` failed: {source}")]
    Restore {
        op: Operation,
        #[source]
        source: TreeError,
    },

    /// Applying a restored operation failed.
    #[error("applying `{transformed}` (restored from `{op}`) failed: {source}")]
    Apply {
        op: Operation,
        transformed: Operation,
        #[source]
        source: TreeError,
    },

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// No id left for the merge version.
    #[error("id generation failed: {0}")]
    Id(#[from] TypeError),
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
