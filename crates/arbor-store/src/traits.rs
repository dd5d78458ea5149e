use std::collections::HashMap;
use std::sync::Arc;

use arbor_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;

/// Handle returned by [`ObjectStore::listen`], used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Callback notified when a key becomes present or is deleted.
///
/// Listeners run synchronously on the writing thread and must not block.
pub trait KeyListener: Send + Sync {
    fn changed(&self, key: &ObjectId, value: Option<&StoredObject>);
}

impl<F> KeyListener for F
where
    F: Fn(&ObjectId, Option<&StoredObject>) + Send + Sync,
{
    fn changed(&self, key: &ObjectId, value: Option<&StoredObject>) {
        self(key, value)
    }
}

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written: the same data always produces the
///   same ID, so concurrent writes of one key are idempotent.
/// - Concurrent reads are always safe.
/// - The store never interprets object contents.
/// - A missing key is `Ok(None)`; errors are reserved for real failures.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    ///
    /// If the object already exists, this is a no-op.
    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Delete an object by ID. Returns `true` if the object existed.
    ///
    /// Intended for garbage collection only. Deleting a referenced object
    /// turns later reads of it into integrity errors.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Register a listener on a key.
    fn listen(&self, id: &ObjectId, listener: Arc<dyn KeyListener>) -> ListenerId;

    /// Unregister a listener. Returns `true` if it was registered.
    fn remove_listener(&self, id: &ObjectId, listener: ListenerId) -> bool;

    /// Check whether an object exists in the store.
    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Read an object that the structure proves must exist.
    fn get_required(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.get(id)?.ok_or(StoreError::MissingObject(*id))
    }

    /// Read many objects in one round trip.
    ///
    /// The result only contains the keys that were found. The default
    /// implementation calls `get()` per key; remote backends override it.
    fn get_all(&self, ids: &[ObjectId]) -> StoreResult<HashMap<ObjectId, StoredObject>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(obj) = self.get(id)? {
                found.insert(*id, obj);
            }
        }
        Ok(found)
    }

    /// Write multiple objects and return their IDs.
    fn put_all(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.put(obj)).collect()
    }

    /// Hint that `id` will be read soon. Never blocks.
    fn prefetch(&self, _id: &ObjectId) {}

    /// Number of outstanding asynchronous requests (queued prefetches,
    /// unflushed writes). Zero for synchronous backends.
    fn pending_size(&self) -> usize {
        0
    }
}
