use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("store error: {0}")]
    Store(#[from] arbor_store::StoreError),

    #[error("tree error: {0}")]
    Tree(#[from] arbor_tree::TreeError),

    #[error("history error: {0}")]
    History(#[from] arbor_history::HistoryError),

    #[error("merge failed: {0}")]
    Merge(#[from] arbor_merge::MergeError),

    #[error("id error: {0}")]
    Id(#[from] arbor_types::TypeError),
}

pub type SdkResult<T> = Result<T, SdkError>;
