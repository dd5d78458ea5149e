use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::node::{NodeId, ROOT_ID};

/// Repository identity of a tree.
///
/// Every snapshot derived from the same root creation event carries the
/// same `TreeId`; merging trees with different ids is refused.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeId(String);

impl TreeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identity (128 bits, hex encoded).
    pub fn random() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeId({})", self.0)
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh ids for new nodes and versions.
pub trait IdGenerator: Send + Sync {
    /// Return an id never returned before by this generator.
    fn generate(&self) -> Result<u64, TypeError>;

    /// Return `count` fresh ids.
    fn generate_many(&self, count: usize) -> Result<Vec<u64>, TypeError> {
        (0..count).map(|_| self.generate()).collect()
    }
}

/// Generates `(client_id << 32) | counter` ids.
///
/// Replicas use distinct client ids, so ids created concurrently on
/// different replicas never collide. Because the client id is non-zero the
/// generated ids are always greater than [`ROOT_ID`].
#[derive(Debug)]
pub struct ClientIdGenerator {
    client_id: u32,
    counter: AtomicU64,
}

impl ClientIdGenerator {
    pub fn new(client_id: u32) -> Result<Self, TypeError> {
        if client_id == 0 {
            return Err(TypeError::ZeroClientId);
        }
        Ok(Self {
            client_id,
            counter: AtomicU64::new(0),
        })
    }

    /// A generator with a random non-zero client id.
    pub fn random() -> Self {
        let client_id = rand::random::<u32>().max(1);
        Self {
            client_id,
            counter: AtomicU64::new(0),
        }
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }
}

impl IdGenerator for ClientIdGenerator {
    fn generate(&self) -> Result<NodeId, TypeError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        if seq > u64::from(u32::MAX) {
            return Err(TypeError::IdSpaceExhausted(self.client_id));
        }
        let id = (u64::from(self.client_id) << 32) | seq;
        debug_assert!(id > ROOT_ID);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn zero_client_id_is_rejected() {
        assert_eq!(
            ClientIdGenerator::new(0).unwrap_err(),
            TypeError::ZeroClientId
        );
    }

    #[test]
    fn ids_embed_client_id() {
        let gen = ClientIdGenerator::new(3).unwrap();
        assert_eq!(gen.generate().unwrap(), (3u64 << 32) | 1);
        assert_eq!(gen.generate().unwrap(), (3u64 << 32) | 2);
    }

    #[test]
    fn distinct_clients_never_collide() {
        let a = ClientIdGenerator::new(1).unwrap();
        let b = ClientIdGenerator::new(2).unwrap();
        let mut seen = HashSet::new();
        for id in a.generate_many(100).unwrap() {
            assert!(seen.insert(id));
        }
        for id in b.generate_many(100).unwrap() {
            assert!(seen.insert(id));
        }
        assert!(!seen.contains(&ROOT_ID));
    }

    #[test]
    fn random_tree_ids_differ() {
        assert_ne!(TreeId::random(), TreeId::random());
        assert_eq!(TreeId::random().as_str().len(), 32);
    }

    #[test]
    fn concurrent_generation_is_unique() {
        use std::sync::Arc;
        use std::thread;

        let gen = Arc::new(ClientIdGenerator::new(9).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gen = Arc::clone(&gen);
                thread::spawn(move || gen.generate_many(250).unwrap())
            })
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().expect("thread should not panic") {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 1000);
    }
}
