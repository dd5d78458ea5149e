//! Error types for version history.

use arbor_store::StoreError;
use arbor_tree::TreeError;
use arbor_types::ObjectId;

/// Errors that can occur while creating, loading or walking versions.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The version record names a tree that cannot be loaded.
    #[error("version {version} references unreadable tree {tree}: {source}")]
    BrokenTree {
        version: ObjectId,
        tree: ObjectId,
        #[source]
        source: TreeError,
    },

    /// Tree failure while building a version.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Underlying store failure, including missing parent versions.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for history results.
pub type HistoryResult<T> = Result<T, HistoryError>;
