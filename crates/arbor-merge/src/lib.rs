//! Version merging for Arbor.
//!
//! [`VersionMerger`] reconciles two versions of the same tree. Equal
//! versions and versions where one contains the other resolve without a
//! new commit. In the general case the merger finds the common ancestor,
//! captures the intent of every operation on both branches against the
//! tree it was authored on, and replays those intents on the ancestor's
//! tree. The result is a merge version whose log holds the original
//! operations.

pub mod config;
pub mod error;
pub mod merger;

pub use config::{BranchOrder, MergeConfig};
pub use error::{MergeError, MergeResult};
pub use merger::{MergeOutcome, VersionMerger};
