//! Foundation types for Arbor, a replicated, version-controlled model tree.
//!
//! Every other Arbor crate depends on `arbor-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Content-addressed identifier (BLAKE3 hash) of a stored record
//! - [`NodeId`] — 64-bit node identifier, unique within a tree lineage
//! - [`TreeId`] — Repository identity shared by every snapshot of one model
//! - [`ConceptReference`] / [`NodeReference`] — Type tags and reference targets
//! - [`IdGenerator`] — Source of fresh node and version ids

pub mod error;
pub mod identity;
pub mod node;
pub mod object;

pub use error::TypeError;
pub use identity::{ClientIdGenerator, IdGenerator, TreeId};
pub use node::{ConceptReference, NodeId, NodeReference, DETACHED_NODES_ROLE, ROOT_ID};
pub use object::ObjectId;
