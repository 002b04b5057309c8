//! Keyspace: typed entries, the key index, the TTL heap, and destruction
//! routing.
//!
//! Entries live in a slab arena so the TTL heap can reference them by
//! stable id. The index maps (hash, key bytes) to arena ids; every heap
//! reorder writes the new position back into the owning entry, so TTL
//! updates and deletes stay O(log n) with no searching.

use ahash::RandomState;
use slab::Slab;

use crate::heap::{HeapItem, MinHeap};
use crate::index::KeyIndex;
use crate::pool::WorkerPool;
use crate::zset::SortedSet;

/// Stable arena id of one entry.
pub type EntryId = usize;

/// Value payload of one keyspace entry.
#[derive(Debug)]
pub enum Value {
    /// Raw byte string.
    Str(Vec<u8>),
    /// Sorted set of (name, score) pairs.
    ZSet(SortedSet),
}

/// One keyspace record.
#[derive(Debug)]
pub struct Entry {
    key: Box<[u8]>,
    hash: u64,
    /// Typed payload; handlers pattern-match and report kind mismatches.
    pub value: Value,
    heap_slot: Option<usize>,
}

impl Entry {
    /// Key bytes of this record.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

/// The in-memory database owned by the reactor thread.
#[derive(Debug)]
pub struct Keyspace {
    entries: Slab<Entry>,
    index: KeyIndex<EntryId>,
    ttl: MinHeap<EntryId>,
    hasher: RandomState,
    destructor: WorkerPool,
    large_container_len: usize,
}

impl Keyspace {
    /// Creates an empty keyspace with its deferred-destruction pool.
    #[must_use]
    pub fn new(destructor_workers: usize, large_container_len: usize) -> Self {
        Self {
            entries: Slab::new(),
            index: KeyIndex::new(),
            ttl: MinHeap::new(),
            hasher: RandomState::new(),
            destructor: WorkerPool::new(destructor_workers),
            large_container_len,
        }
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no keys are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Arena id of `key`, if present.
    ///
    /// Takes `&mut self` because every index operation may advance an
    /// in-flight incremental resize.
    pub fn lookup(&mut self, key: &[u8]) -> Option<EntryId> {
        let hash = self.hasher.hash_one(key);
        let entries = &self.entries;
        self.index
            .lookup(hash, |id| entries[id].key.as_ref() == key)
    }

    /// Entry stored under `key`, if present.
    pub fn get(&mut self, key: &[u8]) -> Option<&Entry> {
        let id = self.lookup(key)?;
        Some(&self.entries[id])
    }

    /// Mutable entry stored under `key`, if present.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let id = self.lookup(key)?;
        Some(&mut self.entries[id])
    }

    /// Entry behind an id returned by [`Keyspace::lookup`] or
    /// [`Keyspace::insert`].
    #[must_use]
    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id]
    }

    /// Mutable entry behind a live id.
    pub fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id]
    }

    /// Inserts a fresh entry. The caller guarantees `key` is absent.
    pub fn insert(&mut self, key: &[u8], value: Value) -> EntryId {
        let hash = self.hasher.hash_one(key);
        let id = self.entries.insert(Entry {
            key: Box::from(key),
            hash,
            value,
            heap_slot: None,
        });
        self.index.insert(hash, id);
        id
    }

    /// Removes `key`, routing value destruction per the size heuristic.
    /// Returns `true` if the key was present.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        let hash = self.hasher.hash_one(key);
        let entries = &self.entries;
        let Some(id) = self
            .index
            .remove(hash, |id| entries[id].key.as_ref() == key)
        else {
            return false;
        };
        self.destroy_entry(id);
        true
    }

    /// Arms, re-arms, or clears (negative `ttl_ms`) the TTL of a live entry.
    pub fn set_ttl(&mut self, id: EntryId, ttl_ms: i64, now_ms: u64) {
        if ttl_ms < 0 {
            if let Some(slot) = self.entries[id].heap_slot.take() {
                let entries = &mut self.entries;
                let mut track = |owner: EntryId, pos: usize| {
                    entries[owner].heap_slot = Some(pos);
                };
                self.ttl.remove(slot, &mut track);
            }
            return;
        }
        let expire_at = now_ms.saturating_add(u64::try_from(ttl_ms).unwrap_or(0));
        let slot = self.entries[id].heap_slot;
        let entries = &mut self.entries;
        let mut track = |owner: EntryId, pos: usize| {
            entries[owner].heap_slot = Some(pos);
        };
        self.ttl.upsert(
            slot,
            HeapItem {
                expire_at,
                owner: id,
            },
            &mut track,
        );
    }

    /// Remaining TTL of a live entry in milliseconds: -1 when no TTL is
    /// armed, clamped to 0 once the deadline passed.
    #[must_use]
    pub fn ttl_remaining_ms(&self, id: EntryId, now_ms: u64) -> i64 {
        let Some(slot) = self.entries[id].heap_slot else {
            return -1;
        };
        let expire_at = self
            .ttl
            .get(slot)
            .map_or(now_ms, |item| item.expire_at);
        i64::try_from(expire_at.saturating_sub(now_ms)).unwrap_or(i64::MAX)
    }

    /// Earliest armed TTL deadline, for the poll-timeout computation.
    #[must_use]
    pub fn next_expiry_ms(&self) -> Option<u64> {
        self.ttl.peek().map(|item| item.expire_at)
    }

    /// Removes entries whose deadline passed, up to `budget` of them, and
    /// returns how many were evicted. Anything left over is picked up on
    /// the next tick.
    pub fn evict_expired(&mut self, now_ms: u64, budget: usize) -> usize {
        let mut evicted = 0_usize;
        while evicted < budget {
            let Some(item) = self.ttl.peek() else { break };
            if item.expire_at >= now_ms {
                break;
            }
            let id = item.owner;
            let hash = self.entries[id].hash;
            let removed = self.index.remove(hash, |candidate| candidate == id);
            debug_assert!(removed == Some(id));
            self.destroy_entry(id);
            evicted += 1;
        }
        evicted
    }

    /// Visits every live key, in no defined order.
    pub fn for_each_key(&self, mut visit: impl FnMut(&[u8])) {
        let entries = &self.entries;
        self.index.for_each(|id| visit(entries[id].key.as_ref()));
    }

    // Detaches the TTL item, pulls the entry out of the arena, and routes
    // the value to its destructor. The id must already be out of the index.
    fn destroy_entry(&mut self, id: EntryId) {
        if let Some(slot) = self.entries[id].heap_slot.take() {
            let entries = &mut self.entries;
            let mut track = |owner: EntryId, pos: usize| {
                entries[owner].heap_slot = Some(pos);
            };
            self.ttl.remove(slot, &mut track);
        }
        let entry = self.entries.remove(id);
        self.dispose(entry.value);
    }

    fn dispose(&self, value: Value) {
        let deferred = match &value {
            Value::ZSet(set) => set.len() > self.large_container_len,
            Value::Str(_) => false,
        };
        if deferred {
            self.destructor.execute(move || drop(value));
        } else {
            drop(value);
        }
    }
}
