//! Persistent model trees for Arbor.
//!
//! A [`Tree`] is an immutable snapshot of a node graph. Node records are
//! stored as content-addressed objects and indexed by node id through a
//! hash array mapped trie ([`hamt`]), so every write produces a new
//! snapshot that shares all untouched blocks with its predecessor. Two
//! snapshots with the same content have the same hash, whatever edits led
//! to them.
//!
//! # Key Types
//!
//! - [`Tree`] -- snapshot handle with node-id based reads and pure writes
//! - [`NodeData`] -- the persisted record of a single node
//! - [`TreeChangeVisitor`] -- receives the delta between two snapshots

pub mod error;
pub mod hamt;
pub mod node;
pub mod tree;
pub mod visitor;

pub use error::{TreeError, TreeResult};
pub use node::{ChildLink, NodeData};
pub use tree::{Tree, TreeData, APPEND};
pub use visitor::{TreeChange, TreeChangeVisitor};
