//! Open-addressing hash table with double hashing and tombstone deletion.
//!
//! The scheduler uses this to find a running child by pid in O(1) when its
//! completion is observed. The contract is deliberately small: insert,
//! remove-by-key, lookup and size. There is no ordered iteration.
//!
//! Capacity is always a power of two and only ever grows. Probe steps are
//! forced odd, so every probe sequence visits every slot. Occupancy
//! (live entries plus tombstones) is capped around half the capacity, so
//! empty slots always remain and every probe terminates.

use std::fmt;

const MIN_CAPACITY: usize = 8;

/// Key contract for [`OpenTable`]: `hash1` picks the initial slot, `hash2`
/// the probe step. Implementations must return a step in `1..capacity` that
/// is nonzero modulo the capacity; the blanket rule here is to force it odd,
/// which is coprime with any power-of-two capacity.
pub trait ProbeKey: Copy + Eq {
    fn hash1(&self, capacity: usize) -> usize;
    fn hash2(&self, capacity: usize) -> usize;
}

impl ProbeKey for u32 {
    fn hash1(&self, capacity: usize) -> usize {
        *self as usize % capacity
    }

    fn hash2(&self, capacity: usize) -> usize {
        (*self as usize % (capacity - 1) + 1) | 1
    }
}

/// Returned by [`OpenTable::insert`] when the key is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateKey;

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key is already present in the table")
    }
}

impl std::error::Error for DuplicateKey {}

enum Slot<K, V> {
    Empty,
    /// Left behind by a removal. Skipped while probing (the sequence must
    /// not stop early), reusable for insertion, dropped on rehash.
    Tombstone,
    Occupied(K, V),
}

pub struct OpenTable<K: ProbeKey, V> {
    slots: Vec<Slot<K, V>>,
    len: usize,
    tombstones: usize,
}

impl<K: ProbeKey, V> OpenTable<K, V> {
    /// Create a table holding at least `capacity` slots (rounded up to a
    /// power of two, never below the internal minimum).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: empty_slots(capacity.max(MIN_CAPACITY).next_power_of_two()),
            len: 0,
            tombstones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Store `value` under `key`, growing the table first if it is half
    /// full. Fails if the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), DuplicateKey> {
        if self.len * 2 > self.capacity() {
            self.rehash(self.capacity() * 2);
        } else if (self.len + self.tombstones) * 2 > self.capacity() {
            // shed accumulated tombstones, capacity unchanged
            self.rehash(self.capacity());
        }

        let cap = self.capacity();
        let step = key.hash2(cap);
        let mut index = key.hash1(cap);
        let mut reusable = None;
        loop {
            match &self.slots[index] {
                Slot::Empty => break,
                Slot::Tombstone => {
                    reusable.get_or_insert(index);
                }
                Slot::Occupied(present, _) if *present == key => return Err(DuplicateKey),
                Slot::Occupied(..) => {}
            }
            index = (index + step) % cap;
        }

        let target = reusable.unwrap_or(index);
        if matches!(self.slots[target], Slot::Tombstone) {
            self.tombstones -= 1;
        }
        self.slots[target] = Slot::Occupied(key, value);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the value stored under `key`, leaving a tombstone
    /// so probe sequences running through this slot stay correct.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.find(key)?;
        match std::mem::replace(&mut self.slots[index], Slot::Tombstone) {
            Slot::Occupied(_, value) => {
                self.tombstones += 1;
                self.len -= 1;
                Some(value)
            }
            _ => unreachable!("find returned a slot that is not occupied"),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        match &self.slots[self.find(key)?] {
            Slot::Occupied(_, value) => Some(value),
            _ => None,
        }
    }

    fn find(&self, key: &K) -> Option<usize> {
        let cap = self.capacity();
        let step = key.hash2(cap);
        let mut index = key.hash1(cap);
        loop {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Occupied(present, _) if present == key => return Some(index),
                _ => {}
            }
            index = (index + step) % cap;
        }
    }

    fn rehash(&mut self, new_capacity: usize) {
        let old = std::mem::replace(&mut self.slots, empty_slots(new_capacity));
        self.tombstones = 0;
        for slot in old {
            if let Slot::Occupied(key, value) = slot {
                let step = key.hash2(new_capacity);
                let mut index = key.hash1(new_capacity);
                while !matches!(self.slots[index], Slot::Empty) {
                    index = (index + step) % new_capacity;
                }
                self.slots[index] = Slot::Occupied(key, value);
            }
        }
    }
}

fn empty_slots<K, V>(capacity: usize) -> Vec<Slot<K, V>> {
    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || Slot::Empty);
    slots
}
