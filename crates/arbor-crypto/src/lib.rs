//! Content hashing for Arbor.
//!
//! Every persisted record is addressed by a domain-separated BLAKE3 hash so
//! that a node record and a version record with identical bytes can never
//! share an id.

pub mod hasher;

pub use hasher::ContentHasher;
