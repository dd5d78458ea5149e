//! The Arbor operation model.
//!
//! Every change to a tree is expressed as an [`Operation`]. Operations are
//! the unit of persistence (a version stores the operations that produced
//! it) and of merging: an operation can be applied to a tree, and its
//! intent can be captured against the tree it was authored on and later
//! restored against a tree that has diverged in the meantime.
//!
//! # Key Types
//!
//! - [`Operation`] -- closed set of tree edits, serializable
//! - [`OperationIntent`] -- identity-based form of an operation for replay
//! - [`WriteView`] -- scoped editor that applies and logs operations

pub mod intent;
pub mod operation;
pub mod view;

pub use intent::{CapturedInsertPosition, OperationIntent};
pub use operation::{Applied, NewChild, Operation};
pub use view::WriteView;
