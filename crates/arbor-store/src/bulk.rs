//! Bulk query engine.
//!
//! A traversal registers the keys it needs together with a continuation.
//! Nothing is read until [`BulkQuery::execute`] runs; it then resolves the
//! queued keys with one `get_all` per batch and resumes the continuations,
//! which may queue further keys for the next batch. A breadth-first walk
//! over a tree therefore costs one round trip per level instead of one per
//! node.

use std::collections::{HashMap, HashSet, VecDeque};

use arbor_types::ObjectId;
use tracing::debug;

use crate::config::BulkQueryConfig;
use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

type Continuation<'a> = Box<dyn FnOnce(&mut BulkQuery<'a>, Option<StoredObject>) -> StoreResult<()> + 'a>;

/// Batched lookup scheduler over an [`ObjectStore`].
pub struct BulkQuery<'a> {
    store: &'a dyn ObjectStore,
    config: BulkQueryConfig,
    queue: VecDeque<(ObjectId, Continuation<'a>)>,
    round_trips: usize,
}

impl<'a> BulkQuery<'a> {
    pub fn new(store: &'a dyn ObjectStore, config: BulkQueryConfig) -> Self {
        Self {
            store,
            config,
            queue: VecDeque::new(),
            round_trips: 0,
        }
    }

    /// Queue a lookup. The continuation receives `None` if the key is absent.
    pub fn query<F>(&mut self, id: ObjectId, f: F)
    where
        F: FnOnce(&mut BulkQuery<'a>, Option<StoredObject>) -> StoreResult<()> + 'a,
    {
        self.store.prefetch(&id);
        self.queue.push_back((id, Box::new(f)));
    }

    /// Queue a lookup of a key the structure proves must exist.
    ///
    /// If the key is absent, `execute` fails with
    /// [`StoreError::MissingObject`] and the continuation never runs.
    pub fn query_required<F>(&mut self, id: ObjectId, f: F)
    where
        F: FnOnce(&mut BulkQuery<'a>, StoredObject) -> StoreResult<()> + 'a,
    {
        self.query(id, move |q, found| match found {
            Some(obj) => f(q, obj),
            None => Err(StoreError::MissingObject(id)),
        });
    }

    /// Number of lookups waiting for the next batch.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of `get_all` round trips issued so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips
    }

    /// Resolve queued lookups until no continuation queues more work.
    pub fn execute(&mut self) -> StoreResult<()> {
        while !self.queue.is_empty() {
            let take = self.config.batch_size.max(1).min(self.queue.len());
            let batch: Vec<(ObjectId, Continuation<'a>)> = self.queue.drain(..take).collect();

            let mut seen = HashSet::with_capacity(batch.len());
            let keys: Vec<ObjectId> = batch
                .iter()
                .map(|(id, _)| *id)
                .filter(|id| seen.insert(*id))
                .collect();
            let mut found = self.store.get_all(&keys)?;
            self.round_trips += 1;
            debug!(
                requests = batch.len(),
                unique = keys.len(),
                found = found.len(),
                "bulk query batch resolved"
            );

            // Duplicate keys in one batch each get their own copy.
            let mut remaining: HashMap<ObjectId, usize> = HashMap::new();
            for (id, _) in &batch {
                *remaining.entry(*id).or_default() += 1;
            }
            for (id, cont) in batch {
                let count = remaining.get_mut(&id).map(|c| {
                    *c -= 1;
                    *c
                });
                let value = if count == Some(0) {
                    found.remove(&id)
                } else {
                    found.get(&id).cloned()
                };
                cont(self, value)?;
            }
        }
        Ok(())
    }
}
