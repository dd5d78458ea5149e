//! Version history for Arbor.
//!
//! A [`Version`] names a tree snapshot, the versions it was derived from and
//! the operations that produced it. Versions are content-addressed records,
//! so the history forms a Merkle DAG: a version's hash covers its parents'
//! hashes and therefore its entire past.
//!
//! This crate also answers the two questions a merge asks of that DAG:
//! [`merge_bases`] finds where two tips diverged, and [`LinearHistory`]
//! lists the versions between that point and the tips in replay order.

pub mod error;
pub mod history;
pub mod linear;
pub mod version;

pub use error::{HistoryError, HistoryResult};
pub use history::{common_ancestor, is_ancestor, merge_bases};
pub use linear::LinearHistory;
pub use version::{Lineage, Version, VersionData};
