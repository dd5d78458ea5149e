//! High-level SDK for Arbor.
//!
//! A [`Replica`] owns a head version over a shared object store. Edits are
//! committed as regular versions, and diverged replicas are reconciled by
//! merging their heads. This is the main entry point for applications
//! embedding Arbor.

pub mod error;
pub mod replica;

pub use error::{SdkError, SdkResult};
pub use replica::Replica;

// Re-export key types
pub use arbor_history::{common_ancestor, Lineage, Version};
pub use arbor_merge::{BranchOrder, MergeConfig, MergeOutcome};
pub use arbor_ops::{NewChild, Operation, WriteView};
pub use arbor_store::{CacheConfig, CachingStore, InMemoryObjectStore, ObjectStore};
pub use arbor_tree::{Tree, APPEND};
pub use arbor_types::{
    ClientIdGenerator, ConceptReference, IdGenerator, NodeId, NodeReference, ObjectId, TreeId,
    DETACHED_NODES_ROLE, ROOT_ID,
};
