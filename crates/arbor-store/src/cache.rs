//! Read-through cache with prefetch coalescing.
//!
//! Objects are immutable, so a cached object never goes stale; the only
//! invalidation is an explicit delete. Prefetch hints are queued and ride
//! along with the next round trip to the wrapped store instead of issuing
//! a request of their own.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use arbor_types::ObjectId;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::StoreResult;
use crate::object::StoredObject;
use crate::traits::{KeyListener, ListenerId, ObjectStore};

#[derive(Default)]
struct CacheState {
    objects: HashMap<ObjectId, StoredObject>,
    order: VecDeque<ObjectId>,
}

impl CacheState {
    fn insert(&mut self, id: ObjectId, obj: StoredObject, capacity: usize) {
        if self.objects.insert(id, obj).is_none() {
            self.order.push_back(id);
        }
        while self.objects.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.objects.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn remove(&mut self, id: &ObjectId) {
        if self.objects.remove(id).is_some() {
            self.order.retain(|k| k != id);
        }
    }
}

/// Caching front-end for any [`ObjectStore`].
pub struct CachingStore {
    inner: Arc<dyn ObjectStore>,
    config: CacheConfig,
    cache: RwLock<CacheState>,
    prefetches: Mutex<Vec<ObjectId>>,
}

impl CachingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            cache: RwLock::new(CacheState::default()),
            prefetches: Mutex::new(Vec::new()),
        }
    }

    /// Number of objects currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.read().expect("lock poisoned").objects.len()
    }

    /// Fetch all queued prefetch hints now.
    pub fn flush_prefetches(&self) -> StoreResult<()> {
        self.fetch_into_cache(&[])?;
        Ok(())
    }

    fn cached(&self, id: &ObjectId) -> Option<StoredObject> {
        self.cache
            .read()
            .expect("lock poisoned")
            .objects
            .get(id)
            .cloned()
    }

    /// Fetch `wanted` plus every queued prefetch in one inner round trip.
    fn fetch_into_cache(&self, wanted: &[ObjectId]) -> StoreResult<HashMap<ObjectId, StoredObject>> {
        let queued = std::mem::take(&mut *self.prefetches.lock().expect("lock poisoned"));
        let mut seen = HashSet::with_capacity(wanted.len() + queued.len());
        let keys: Vec<ObjectId> = wanted
            .iter()
            .chain(queued.iter())
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        debug!(
            requested = wanted.len(),
            prefetched = queued.len(),
            "cache miss, fetching from backing store"
        );
        let found = self.inner.get_all(&keys)?;
        let mut cache = self.cache.write().expect("lock poisoned");
        for (id, obj) in &found {
            cache.insert(*id, obj.clone(), self.config.capacity);
        }
        Ok(found)
    }
}

impl ObjectStore for CachingStore {
    fn get(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        if let Some(obj) = self.cached(id) {
            return Ok(Some(obj));
        }
        let mut found = self.fetch_into_cache(std::slice::from_ref(id))?;
        Ok(found.remove(id))
    }

    fn get_all(&self, ids: &[ObjectId]) -> StoreResult<HashMap<ObjectId, StoredObject>> {
        let mut result = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        {
            let cache = self.cache.read().expect("lock poisoned");
            for id in ids {
                match cache.objects.get(id) {
                    Some(obj) => {
                        result.insert(*id, obj.clone());
                    }
                    None => missing.push(*id),
                }
            }
        }
        if !missing.is_empty() {
            let fetched = self.fetch_into_cache(&missing)?;
            for id in missing {
                if let Some(obj) = fetched.get(&id) {
                    result.insert(id, obj.clone());
                }
            }
        }
        Ok(result)
    }

    fn put(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = self.inner.put(object)?;
        self.cache
            .write()
            .expect("lock poisoned")
            .insert(id, object.clone(), self.config.capacity);
        Ok(id)
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        self.cache.write().expect("lock poisoned").remove(id);
        self.inner.delete(id)
    }

    fn listen(&self, id: &ObjectId, listener: Arc<dyn KeyListener>) -> ListenerId {
        self.inner.listen(id, listener)
    }

    fn remove_listener(&self, id: &ObjectId, listener: ListenerId) -> bool {
        self.inner.remove_listener(id, listener)
    }

    fn prefetch(&self, id: &ObjectId) {
        if self.cached(id).is_some() {
            return;
        }
        let queued = {
            let mut prefetches = self.prefetches.lock().expect("lock poisoned");
            if !prefetches.contains(id) {
                prefetches.push(*id);
            }
            prefetches.len()
        };
        if queued >= self.config.prefetch_flush_threshold {
            // A failed speculative read is retried by the real lookup later.
            if let Err(e) = self.flush_prefetches() {
                debug!(error = %e, "prefetch flush failed");
            }
        }
    }

    fn pending_size(&self) -> usize {
        self.prefetches.lock().expect("lock poisoned").len() + self.inner.pending_size()
    }
}

impl std::fmt::Debug for CachingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingStore")
            .field("cached", &self.cached_len())
            .field("pending", &self.pending_size())
            .finish()
    }
}
