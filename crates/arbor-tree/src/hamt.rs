//! Content-addressed hash array mapped trie from node id to node record.
//!
//! Keys are consumed five bits per level, least significant bits first.
//! The root block is always an internal block. Below the root, an internal
//! block whose only child is a leaf is collapsed into that leaf, so every
//! key sits at the shallowest level where its prefix is unique and the
//! block layout depends only on the key set. Updating one key rewrites the
//! blocks on its path; every other block is shared with the previous root.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use arbor_store::{BulkQuery, BulkQueryConfig, ObjectKind, ObjectStore, Record, StoreError, StoreResult};
use arbor_types::{NodeId, ObjectId};
use serde::{Deserialize, Serialize};

/// Bits of the key consumed per level.
pub const BITS_PER_LEVEL: u32 = 5;

/// Deepest level a 64-bit key can reach.
pub const MAX_LEVELS: u32 = 13;

const SLOT_MASK: u64 = (1 << BITS_PER_LEVEL) - 1;

/// One persisted block of the trie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HamtBlock {
    Leaf {
        key: NodeId,
        value: ObjectId,
    },
    Internal {
        bitmap: u32,
        children: Vec<ObjectId>,
    },
}

impl Record for HamtBlock {
    const KIND: ObjectKind = ObjectKind::Hamt;
}

/// A key whose value differs between two roots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HamtChange {
    pub key: NodeId,
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
}

fn slot(key: NodeId, level: u32) -> u32 {
    debug_assert!(level < MAX_LEVELS);
    ((key >> (level * BITS_PER_LEVEL)) & SLOT_MASK) as u32
}

fn bit(slot: u32) -> u32 {
    1 << slot
}

fn child_index(bitmap: u32, slot: u32) -> usize {
    (bitmap & (bit(slot) - 1)).count_ones() as usize
}

fn child_at(id: &ObjectId, bitmap: u32, children: &[ObjectId], slot: u32) -> StoreResult<Option<ObjectId>> {
    if bitmap & bit(slot) == 0 {
        return Ok(None);
    }
    children
        .get(child_index(bitmap, slot))
        .copied()
        .map(Some)
        .ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("bitmap {bitmap:#010x} has more bits than {} children", children.len()),
        })
}

fn load(store: &dyn ObjectStore, id: &ObjectId) -> StoreResult<HamtBlock> {
    HamtBlock::from_stored_object(&store.get_required(id)?)
}

fn write(store: &dyn ObjectStore, block: &HamtBlock) -> StoreResult<ObjectId> {
    store.put(&block.to_stored_object()?)
}

/// Write an empty root block and return its id.
pub fn empty(store: &dyn ObjectStore) -> StoreResult<ObjectId> {
    write(
        store,
        &HamtBlock::Internal {
            bitmap: 0,
            children: Vec::new(),
        },
    )
}

/// Look up a single key.
pub fn get(store: &dyn ObjectStore, root: &ObjectId, key: NodeId) -> StoreResult<Option<ObjectId>> {
    let mut id = *root;
    let mut level = 0;
    loop {
        match load(store, &id)? {
            HamtBlock::Leaf { key: found, value } => return Ok((found == key).then_some(value)),
            HamtBlock::Internal { bitmap, children } => match child_at(&id, bitmap, &children, slot(key, level))? {
                Some(child) => {
                    id = child;
                    level += 1;
                }
                None => return Ok(None),
            },
        }
    }
}

/// Insert or replace a key, returning the new root.
pub fn put(store: &dyn ObjectStore, root: &ObjectId, key: NodeId, value: ObjectId) -> StoreResult<ObjectId> {
    put_at(store, *root, key, value, 0)
}

fn put_at(store: &dyn ObjectStore, id: ObjectId, key: NodeId, value: ObjectId, level: u32) -> StoreResult<ObjectId> {
    match load(store, &id)? {
        HamtBlock::Leaf { key: existing, .. } if existing == key => write(store, &HamtBlock::Leaf { key, value }),
        HamtBlock::Leaf { key: existing, .. } => {
            let leaf = write(store, &HamtBlock::Leaf { key, value })?;
            split(store, (existing, id), (key, leaf), level)
        }
        HamtBlock::Internal { mut bitmap, mut children } => {
            let s = slot(key, level);
            let i = child_index(bitmap, s);
            match child_at(&id, bitmap, &children, s)? {
                Some(child) => children[i] = put_at(store, child, key, value, level + 1)?,
                None => {
                    children.insert(i, write(store, &HamtBlock::Leaf { key, value })?);
                    bitmap |= bit(s);
                }
            }
            write(store, &HamtBlock::Internal { bitmap, children })
        }
    }
}

/// Build the internal blocks that separate two leaves with distinct keys.
fn split(
    store: &dyn ObjectStore,
    a: (NodeId, ObjectId),
    b: (NodeId, ObjectId),
    level: u32,
) -> StoreResult<ObjectId> {
    let (sa, sb) = (slot(a.0, level), slot(b.0, level));
    let block = if sa == sb {
        HamtBlock::Internal {
            bitmap: bit(sa),
            children: vec![split(store, a, b, level + 1)?],
        }
    } else {
        let children = if sa < sb { vec![a.1, b.1] } else { vec![b.1, a.1] };
        HamtBlock::Internal {
            bitmap: bit(sa) | bit(sb),
            children,
        }
    };
    write(store, &block)
}

enum Removal {
    Absent,
    /// `None` when the subtree became empty.
    Removed(Option<ObjectId>),
}

/// Remove a key, returning the new root. Removing an absent key returns
/// `root` unchanged.
pub fn remove(store: &dyn ObjectStore, root: &ObjectId, key: NodeId) -> StoreResult<ObjectId> {
    match remove_at(store, *root, key, 0)? {
        Removal::Absent => Ok(*root),
        Removal::Removed(Some(id)) => Ok(id),
        Removal::Removed(None) => empty(store),
    }
}

fn remove_at(store: &dyn ObjectStore, id: ObjectId, key: NodeId, level: u32) -> StoreResult<Removal> {
    match load(store, &id)? {
        HamtBlock::Leaf { key: existing, .. } => Ok(if existing == key {
            Removal::Removed(None)
        } else {
            Removal::Absent
        }),
        HamtBlock::Internal { mut bitmap, mut children } => {
            let s = slot(key, level);
            let Some(child) = child_at(&id, bitmap, &children, s)? else {
                return Ok(Removal::Absent);
            };
            let i = child_index(bitmap, s);
            match remove_at(store, child, key, level + 1)? {
                Removal::Absent => return Ok(Removal::Absent),
                Removal::Removed(Some(replacement)) => children[i] = replacement,
                Removal::Removed(None) => {
                    children.remove(i);
                    bitmap &= !bit(s);
                }
            }
            if level > 0 {
                match children.as_slice() {
                    [] => return Ok(Removal::Removed(None)),
                    [only] => {
                        if let HamtBlock::Leaf { .. } = load(store, only)? {
                            return Ok(Removal::Removed(Some(*only)));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Removal::Removed(Some(write(
                store,
                &HamtBlock::Internal { bitmap, children },
            )?)))
        }
    }
}

/// Queue a lookup of `key` on a bulk query. The continuation receives the
/// value, or `None` if the key is absent.
pub fn query<'a, F>(q: &mut BulkQuery<'a>, root: ObjectId, key: NodeId, f: F)
where
    F: FnOnce(&mut BulkQuery<'a>, Option<ObjectId>) -> StoreResult<()> + 'a,
{
    query_at(q, root, key, 0, f)
}

fn query_at<'a, F>(q: &mut BulkQuery<'a>, id: ObjectId, key: NodeId, level: u32, f: F)
where
    F: FnOnce(&mut BulkQuery<'a>, Option<ObjectId>) -> StoreResult<()> + 'a,
{
    q.query_required(id, move |q, obj| match HamtBlock::from_stored_object(&obj)? {
        HamtBlock::Leaf { key: found, value } => f(q, (found == key).then_some(value)),
        HamtBlock::Internal { bitmap, children } => match child_at(&id, bitmap, &children, slot(key, level))? {
            Some(child) => {
                query_at(q, child, key, level + 1, f);
                Ok(())
            }
            None => f(q, None),
        },
    });
}

/// Look up many keys in one bulk query. Absent keys are left out.
pub fn get_many(
    store: &dyn ObjectStore,
    root: &ObjectId,
    keys: &[NodeId],
    config: BulkQueryConfig,
) -> StoreResult<HashMap<NodeId, ObjectId>> {
    let found = Rc::new(RefCell::new(HashMap::with_capacity(keys.len())));
    let mut q = BulkQuery::new(store, config);
    for &key in keys {
        let sink = Rc::clone(&found);
        query(&mut q, *root, key, move |_, value| {
            if let Some(value) = value {
                sink.borrow_mut().insert(key, value);
            }
            Ok(())
        });
    }
    q.execute()?;
    let result = std::mem::take(&mut *found.borrow_mut());
    Ok(result)
}

/// All entries below `root`, loaded level by level.
pub fn entries(
    store: &dyn ObjectStore,
    root: &ObjectId,
    config: BulkQueryConfig,
) -> StoreResult<BTreeMap<NodeId, ObjectId>> {
    fn collect<'a>(q: &mut BulkQuery<'a>, id: ObjectId, out: Rc<RefCell<BTreeMap<NodeId, ObjectId>>>) {
        q.query_required(id, move |q, obj| {
            match HamtBlock::from_stored_object(&obj)? {
                HamtBlock::Leaf { key, value } => {
                    out.borrow_mut().insert(key, value);
                }
                HamtBlock::Internal { children, .. } => {
                    for child in children {
                        collect(q, child, Rc::clone(&out));
                    }
                }
            }
            Ok(())
        });
    }

    let found = Rc::new(RefCell::new(BTreeMap::new()));
    let mut q = BulkQuery::new(store, config);
    collect(&mut q, *root, Rc::clone(&found));
    q.execute()?;
    let result = std::mem::take(&mut *found.borrow_mut());
    Ok(result)
}

/// Keys whose values differ between two roots, sorted by key.
///
/// Blocks with equal ids are skipped without being read.
pub fn diff(store: &dyn ObjectStore, old: &ObjectId, new: &ObjectId) -> StoreResult<Vec<HamtChange>> {
    let mut out = Vec::new();
    diff_at(store, *old, *new, &mut out)?;
    out.sort_by_key(|change| change.key);
    Ok(out)
}

fn diff_at(store: &dyn ObjectStore, old: ObjectId, new: ObjectId, out: &mut Vec<HamtChange>) -> StoreResult<()> {
    if old == new {
        return Ok(());
    }
    match (load(store, &old)?, load(store, &new)?) {
        (
            HamtBlock::Internal {
                bitmap: old_bitmap,
                children: old_children,
            },
            HamtBlock::Internal {
                bitmap: new_bitmap,
                children: new_children,
            },
        ) => {
            for s in 0..(1 << BITS_PER_LEVEL) {
                let before = child_at(&old, old_bitmap, &old_children, s)?;
                let after = child_at(&new, new_bitmap, &new_children, s)?;
                match (before, after) {
                    (Some(before), Some(after)) => diff_at(store, before, after, out)?,
                    (Some(before), None) => diff_subtrees(store, Some(before), None, out)?,
                    (None, Some(after)) => diff_subtrees(store, None, Some(after), out)?,
                    (None, None) => {}
                }
            }
            Ok(())
        }
        _ => diff_subtrees(store, Some(old), Some(new), out),
    }
}

fn diff_subtrees(
    store: &dyn ObjectStore,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
    out: &mut Vec<HamtChange>,
) -> StoreResult<()> {
    let load_all = |id: Option<ObjectId>| match id {
        Some(id) => entries(store, &id, BulkQueryConfig::default()),
        None => Ok(BTreeMap::new()),
    };
    let mut before = load_all(old)?;
    let after = load_all(new)?;
    for (key, value) in after {
        match before.remove(&key) {
            Some(previous) if previous == value => {}
            previous => out.push(HamtChange {
                key,
                old: previous,
                new: Some(value),
            }),
        }
    }
    out.extend(before.into_iter().map(|(key, value)| HamtChange {
        key,
        old: Some(value),
        new: None,
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::InMemoryObjectStore;
    use proptest::prelude::*;

    fn value(key: NodeId) -> ObjectId {
        ObjectId::from_bytes(&key.to_le_bytes())
    }

    fn build(store: &dyn ObjectStore, keys: &[NodeId]) -> ObjectId {
        let mut root = empty(store).unwrap();
        for &key in keys {
            root = put(store, &root, key, value(key)).unwrap();
        }
        root
    }

    #[test]
    fn empty_root_has_no_entries() {
        let store = InMemoryObjectStore::new();
        let root = empty(&store).unwrap();
        assert_eq!(get(&store, &root, 1).unwrap(), None);
        assert!(entries(&store, &root, BulkQueryConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn put_get_replace() {
        let store = InMemoryObjectStore::new();
        let root = build(&store, &[1, 2, 33, 1025]);
        for key in [1, 2, 33, 1025] {
            assert_eq!(get(&store, &root, key).unwrap(), Some(value(key)));
        }
        assert_eq!(get(&store, &root, 65).unwrap(), None);

        let replaced = put(&store, &root, 33, value(99)).unwrap();
        assert_eq!(get(&store, &replaced, 33).unwrap(), Some(value(99)));
        // The old root is untouched.
        assert_eq!(get(&store, &root, 33).unwrap(), Some(value(33)));
    }

    #[test]
    fn keys_differing_only_in_the_top_bit() {
        let store = InMemoryObjectStore::new();
        let high = 1 | (1 << 63);
        let root = build(&store, &[1, high]);
        assert_eq!(get(&store, &root, 1).unwrap(), Some(value(1)));
        assert_eq!(get(&store, &root, high).unwrap(), Some(value(high)));

        let removed = remove(&store, &root, high).unwrap();
        assert_eq!(removed, build(&store, &[1]));
    }

    #[test]
    fn remove_absent_key_keeps_root() {
        let store = InMemoryObjectStore::new();
        let root = build(&store, &[4, 8]);
        assert_eq!(remove(&store, &root, 12).unwrap(), root);
    }

    #[test]
    fn remove_last_key_gives_empty_root() {
        let store = InMemoryObjectStore::new();
        let root = build(&store, &[7]);
        assert_eq!(remove(&store, &root, 7).unwrap(), empty(&store).unwrap());
    }

    #[test]
    fn get_many_skips_absent_keys() {
        let store = InMemoryObjectStore::new();
        let root = build(&store, &(1..50).collect::<Vec<_>>());
        let found = get_many(&store, &root, &[3, 17, 49, 500], BulkQueryConfig::default()).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[&17], value(17));
    }

    #[test]
    fn bulk_lookups_cost_one_round_trip_per_level() {
        let store = InMemoryObjectStore::new();
        // 32 keys that fill exactly one level below the root.
        let keys: Vec<NodeId> = (0..32).collect();
        let root = build(&store, &keys);
        let before = store.round_trips();
        let found = get_many(&store, &root, &keys, BulkQueryConfig::default()).unwrap();
        assert_eq!(found.len(), 32);
        assert_eq!(store.round_trips() - before, 2);
    }

    #[test]
    fn diff_reports_added_changed_removed() {
        let store = InMemoryObjectStore::new();
        let old = build(&store, &[1, 2, 3]);
        let mut new = remove(&store, &old, 2).unwrap();
        new = put(&store, &new, 3, value(30)).unwrap();
        new = put(&store, &new, 4, value(4)).unwrap();

        let changes = diff(&store, &old, &new).unwrap();
        assert_eq!(
            changes,
            vec![
                HamtChange { key: 2, old: Some(value(2)), new: None },
                HamtChange { key: 3, old: Some(value(3)), new: Some(value(30)) },
                HamtChange { key: 4, old: None, new: Some(value(4)) },
            ]
        );
        assert!(diff(&store, &new, &new).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn layout_depends_only_on_key_set(
            keys in proptest::collection::btree_set(any::<u64>(), 0..40),
            removals in proptest::collection::vec(any::<prop::sample::Index>(), 0..20),
        ) {
            let store = InMemoryObjectStore::new();
            let keys: Vec<NodeId> = keys.into_iter().collect();
            let mut reversed = keys.clone();
            reversed.reverse();

            let forward = build(&store, &keys);
            prop_assert_eq!(forward, build(&store, &reversed));

            let mut root = forward;
            let mut remaining: std::collections::BTreeSet<NodeId> = keys.iter().copied().collect();
            if !keys.is_empty() {
                for index in removals {
                    let key = keys[index.index(keys.len())];
                    root = remove(&store, &root, key).unwrap();
                    remaining.remove(&key);
                }
            }
            let rebuilt = build(&store, &remaining.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(root, rebuilt);

            let listed = entries(&store, &root, BulkQueryConfig::default()).unwrap();
            prop_assert_eq!(listed.keys().copied().collect::<Vec<_>>(), remaining.into_iter().collect::<Vec<_>>());
        }
    }
}
