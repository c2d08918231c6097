use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Sentinel for "no slot" in the recency list.
const NIL: usize = usize::MAX;

/// A cache entry together with its recency-list links.
#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    cost: u64,
    prev: usize,
    next: usize,
}

/// The mutex-isolated innards of the cache.
///
/// Entries live in an arena of slots. A hash map indexes keys to slot
/// positions, and an explicit doubly-linked list over slot indices tracks
/// recency, most-recently-used at the head. Using indices instead of pointers
/// avoids reference cycles and keeps the whole structure safe code.
#[derive(Debug)]
struct Inner<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Option<Slot<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    total_cost: u64,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn slot(&self, idx: usize) -> &Slot<K, V> {
        self.slots[idx].as_ref().expect("slot index points to a live slot")
    }

    fn slot_mut(&mut self, idx: usize) -> &mut Slot<K, V> {
        self.slots[idx].as_mut().expect("slot index points to a live slot")
    }

    /// Detaches a slot from the recency list without freeing it.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = self.slot(idx);
            (slot.prev, slot.next)
        };

        match prev {
            NIL => self.head = next,
            p => self.slot_mut(p).next = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.slot_mut(n).prev = prev,
        }
    }

    /// Links a detached slot in as the most-recently-used entry.
    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let slot = self.slot_mut(idx);
            slot.prev = NIL;
            slot.next = old_head;
        }
        match old_head {
            NIL => self.tail = idx,
            h => self.slot_mut(h).prev = idx,
        }
        self.head = idx;
    }

    /// Removes the least-recently-used entry and returns its key.
    fn pop_tail(&mut self) -> Option<K> {
        let idx = self.tail;
        if idx == NIL {
            return None;
        }
        self.unlink(idx);
        let slot = self.slots[idx].take().expect("tail points to a live slot");
        self.free.push(idx);
        self.index.remove(&slot.key);
        self.total_cost -= slot.cost;
        Some(slot.key)
    }

    /// Removes an arbitrary slot from all bookkeeping structures.
    fn remove_slot(&mut self, idx: usize) -> V {
        self.unlink(idx);
        let slot = self.slots[idx].take().expect("slot index points to a live slot");
        self.free.push(idx);
        self.index.remove(&slot.key);
        self.total_cost -= slot.cost;
        slot.value
    }

    /// Stores a fresh slot, reusing a freed arena position if possible.
    fn insert_slot(&mut self, slot: Slot<K, V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }
}

/// A thread-safe LRU store bounded by both entry count and aggregate cost.
///
/// All operations are atomic with respect to each other: a single mutex
/// serializes them, and lookups that refresh recency count as writes. No
/// operation ever observes a partially-evicted state.
///
/// A limit of `0` disables the corresponding bound.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    count_limit: usize,
    total_cost_limit: u64,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    pub fn new(count_limit: usize, total_cost_limit: u64) -> Self {
        Self {
            count_limit,
            total_cost_limit,
            inner: Mutex::new(Inner {
                index: HashMap::new(),
                slots: Vec::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
                total_cost: 0,
            }),
        }
    }

    /// Returns the value stored under `key`, marking it most-recently-used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        match inner.index.get(key).copied() {
            Some(idx) => {
                inner.unlink(idx);
                inner.push_front(idx);
                metric!(counter("cache.hit") += 1);
                Some(inner.slot(idx).value.clone())
            }
            None => {
                metric!(counter("cache.miss") += 1);
                None
            }
        }
    }

    /// Inserts or replaces the value stored under `key`.
    ///
    /// Evicts least-recently-used entries until both the count limit and the
    /// total cost limit hold again. An entry whose own cost exceeds the total
    /// cost limit is rejected outright and nothing is mutated.
    pub fn set(&self, key: K, value: V, cost: u64) {
        if self.total_cost_limit != 0 && cost > self.total_cost_limit {
            tracing::debug!(
                cost,
                limit = self.total_cost_limit,
                "Rejecting cache entry heavier than the total cost limit"
            );
            return;
        }

        let mut inner = self.inner.lock().unwrap();

        match inner.index.get(&key).copied() {
            Some(idx) => {
                let old_cost = inner.slot(idx).cost;
                inner.total_cost = inner.total_cost - old_cost + cost;
                let slot = inner.slot_mut(idx);
                slot.value = value;
                slot.cost = cost;
                inner.unlink(idx);
                inner.push_front(idx);
            }
            None => {
                let idx = inner.insert_slot(Slot {
                    key: key.clone(),
                    value,
                    cost,
                    prev: NIL,
                    next: NIL,
                });
                inner.index.insert(key, idx);
                inner.push_front(idx);
                inner.total_cost += cost;
            }
        }

        self.evict_to_limits(&mut inner);
    }

    /// Removes the entry stored under `key`, if any.
    ///
    /// Removing an absent key is a no-op.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.index.get(key).copied()?;
        Some(inner.remove_slot(idx))
    }

    /// Drops all entries and resets the aggregate cost to zero.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.index.clear();
        inner.slots.clear();
        inner.free.clear();
        inner.head = NIL;
        inner.tail = NIL;
        inner.total_cost = 0;
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The aggregate cost of all live entries.
    pub fn total_cost(&self) -> u64 {
        self.inner.lock().unwrap().total_cost
    }

    /// Returns whether `key` is present without refreshing its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().unwrap().index.contains_key(key)
    }

    fn evict_to_limits(&self, inner: &mut Inner<K, V>) {
        loop {
            let over_count = self.count_limit != 0 && inner.index.len() > self.count_limit;
            let over_cost = self.total_cost_limit != 0 && inner.total_cost > self.total_cost_limit;
            if !over_count && !over_cost {
                break;
            }

            // The newest entry sits at the head and on its own always fits
            // the limits, so this pops someone else or stops.
            if inner.pop_tail().is_none() {
                break;
            }
            metric!(counter("cache.eviction") += 1);
        }
    }
}
