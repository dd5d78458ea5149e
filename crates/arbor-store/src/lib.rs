//! Content-addressed object storage for Arbor.
//!
//! Every persisted piece of a model -- node records, HAMT blocks, tree
//! records, versions -- is stored as an immutable object identified by its
//! BLAKE3 hash (domain-separated by object kind).
//!
//! # Layers
//!
//! - [`ObjectStore`] -- the key/value contract: point and batched reads,
//!   writes, prefetch hints, key listeners, pending-work observability
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`CachingStore`] -- wraps any store, caches immutable objects and
//!   folds prefetch hints into the next round trip
//! - [`BulkQuery`] -- coalesces the point lookups of one traversal into
//!   batched `get_all` round trips
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writing the same object twice is a no-op.
//! 3. Concurrent reads are always safe.
//! 4. A key that the structure proves must exist but cannot be read is an
//!    integrity error ([`StoreError::MissingObject`]); an unknown optional
//!    key is simply absent.

pub mod bulk;
pub mod cache;
pub mod config;
pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use bulk::BulkQuery;
pub use cache::CachingStore;
pub use config::{BulkQueryConfig, CacheConfig};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{ObjectKind, Record, StoredObject};
pub use traits::{KeyListener, ListenerId, ObjectStore};
