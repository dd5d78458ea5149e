use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use arbor_types::ObjectId;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::{KeyListener, ListenerId, ObjectStore};

type ListenerMap = HashMap<ObjectId, Vec<(ListenerId, Arc<dyn KeyListener>)>>;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Objects are cloned on read/write.
/// Every call that reaches the backing map counts as one round trip, which
/// lets callers observe how well lookups are being batched.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
    listeners: RwLock<ListenerMap>,
    next_listener: AtomicU64,
    round_trips: AtomicUsize,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            round_trips: AtomicUsize::new(0),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|obj| obj.size)
            .sum()
    }

    /// Number of read round trips served so far (`get` or `get_all`).
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Return a sorted list of all object IDs in the store.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }

    fn notify(&self, id: &ObjectId, value: Option<&StoredObject>) {
        // Clone the registrations so callbacks run without holding the lock.
        let targets: Vec<Arc<dyn KeyListener>> = {
            let listeners = self.listeners.read().expect("lock poisoned");
            match listeners.get(id) {
                Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };
        trace!(key = %id.short_hex(), listeners = targets.len(), "notifying key listeners");
        for listener in targets {
            listener.changed(id, value);
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn get_all(&self, ids: &[ObjectId]) -> StoreResult<HashMap<ObjectId, StoredObject>> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let map = self.objects.read().expect("lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| map.get(id).map(|obj| (*id, obj.clone())))
            .collect())
    }

    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let inserted = {
            let mut map = self.objects.write().expect("lock poisoned");
            if map.contains_key(&id) {
                false
            } else {
                map.insert(id, object.clone());
                true
            }
        };
        if inserted {
            self.notify(&id, Some(object));
        }
        Ok(id)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let removed = self
            .objects
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some();
        if removed {
            self.notify(id, None);
        }
        Ok(removed)
    }

    fn listen(&self, id: &ObjectId, listener: Arc<dyn KeyListener>) -> ListenerId {
        let handle = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("lock poisoned")
            .entry(*id)
            .or_default()
            .push((handle, listener));
        handle
    }

    fn remove_listener(&self, id: &ObjectId, listener: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("lock poisoned");
        let Some(list) = listeners.get_mut(id) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handle, _)| *handle != listener);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(id);
        }
        removed
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .field("round_trips", &self.round_trips())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use std::sync::Mutex;

    fn node_obj(content: &[u8]) -> StoredObject {
        StoredObject::new(ObjectKind::Node, content.to_vec())
    }

    // -----------------------------------------------------------------------
    // Core reads and writes
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = InMemoryObjectStore::new();
        let obj = node_obj(b"{\"id\":1}");
        let id = store.put(&obj).unwrap();
        assert_eq!(id, obj.compute_id());
        assert_eq!(store.get(&id).unwrap(), Some(obj));
    }

    #[test]
    fn get_missing_returns_none() {
        let store = InMemoryObjectStore::new();
        assert!(store.get(&ObjectId::from_bytes(b"missing")).unwrap().is_none());
    }

    #[test]
    fn get_required_missing_is_integrity_error() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_bytes(b"missing");
        assert!(matches!(
            store.get_required(&id),
            Err(StoreError::MissingObject(missing)) if missing == id
        ));
    }

    #[test]
    fn put_is_idempotent() {
        let store = InMemoryObjectStore::new();
        let obj = node_obj(b"same");
        let id1 = store.put(&obj).unwrap();
        let id2 = store.put(&obj).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_present_and_missing() {
        let store = InMemoryObjectStore::new();
        let id = store.put(&node_obj(b"gone soon")).unwrap();
        assert!(store.delete(&id).unwrap());
        assert!(!store.contains(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
    }

    // -----------------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------------

    #[test]
    fn get_all_is_one_round_trip() {
        let store = InMemoryObjectStore::new();
        let objects = vec![node_obj(b"a"), node_obj(b"b"), node_obj(b"c")];
        let ids = store.put_all(&objects).unwrap();
        let before = store.round_trips();
        let found = store.get_all(&ids).unwrap();
        assert_eq!(store.round_trips(), before + 1);
        assert_eq!(found.len(), 3);
        for (id, obj) in ids.iter().zip(&objects) {
            assert_eq!(&found[id], obj);
        }
    }

    #[test]
    fn get_all_omits_missing_keys() {
        let store = InMemoryObjectStore::new();
        let present = store.put(&node_obj(b"here")).unwrap();
        let absent = ObjectId::from_bytes(b"absent");
        let found = store.get_all(&[present, absent]).unwrap();
        assert!(found.contains_key(&present));
        assert!(!found.contains_key(&absent));
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    #[test]
    fn listener_fires_on_first_write_and_delete() {
        let store = InMemoryObjectStore::new();
        let obj = node_obj(b"watched");
        let id = obj.compute_id();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.listen(
            &id,
            Arc::new(move |_: &ObjectId, value: Option<&StoredObject>| {
                sink.lock().unwrap().push(value.is_some());
            }),
        );

        store.put(&obj).unwrap();
        store.put(&obj).unwrap(); // already present: no event
        store.delete(&id).unwrap();
        assert_eq!(*events.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn removed_listener_is_silent() {
        let store = InMemoryObjectStore::new();
        let obj = node_obj(b"quiet");
        let id = obj.compute_id();
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let handle = store.listen(
            &id,
            Arc::new(move |_: &ObjectId, _: Option<&StoredObject>| {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(store.remove_listener(&id, handle));
        assert!(!store.remove_listener(&id, handle));
        store.put(&obj).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_writes_of_same_key_are_idempotent() {
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.put(&node_obj(b"shared")).unwrap())
            })
            .collect();
        let ids: Vec<ObjectId> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn utility_methods() {
        let store = InMemoryObjectStore::default();
        assert!(store.is_empty());
        store.put(&node_obj(b"12345")).unwrap();
        store.put(&node_obj(b"123456789")).unwrap();
        assert_eq!(store.total_bytes(), 14);
        let ids = store.all_ids();
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
        let debug = format!("{store:?}");
        assert!(debug.contains("object_count"));
    }
}
