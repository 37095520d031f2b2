//! Hash tables for wide equality branch points.
//!
//! When many sibling atoms test the same field (same offset, width and mask)
//! against different constants, at most one of them can pass for any message.
//! Scanning them one by one costs time linear in the number of filters, so
//! the trie gathers them under a single *hashed atom* that loads the field
//! once and finds the matching entry through a [`HashTable`].
//!
//! Besides the buckets, a table keeps the bookkeeping the rest of the engine
//! relies on:
//!
//! - `entries`/`collisions` describe the bucket layout.
//! - `term`/`nterm` count the filters passing through the hashed atom,
//!   split by whether the filter ends at the entry or continues below it.
//!   Their sum always equals the hashed atom's refcount.
//! - `state`/`opt_state` detect when the dispatcher's snapshot of the table
//!   is out of date: every structural change bumps `state`, and code
//!   generation records it in `opt_state`.

use dpf_ir::Shape;
use smallvec::SmallVec;

use crate::trie::AtomId;

/// `log2` of the smallest table.
const MIN_LOG2: u32 = 3;

/// Fibonacci hashing multiplier (2^32 / golden ratio).
const GOLDEN: u32 = 0x9E37_79B9;

/// Bucket of `value` in a table of `2^log2` buckets.
#[inline]
pub(crate) fn bucket_index(value: u32, log2: u32) -> usize {
    debug_assert!((1..32).contains(&log2));
    (value.wrapping_mul(GOLDEN) >> (32 - log2)) as usize
}

/// One value → atom mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HashEntry {
    pub value: u32,
    pub atom: AtomId,
}

pub(crate) type Bucket = SmallVec<[HashEntry; 2]>;

/// Open hash of entry atoms keyed by their comparison value.
#[derive(Clone, Debug)]
pub(crate) struct HashTable {
    shape: Shape,
    /// Level of the entry steps, kept for diagnostics.
    level: u16,
    buckets: Vec<Bucket>,
    log2: u32,
    entries: u32,
    collisions: u32,
    term: u32,
    nterm: u32,
    state: u64,
    opt_state: u64,
}

impl HashTable {
    pub fn new(shape: Shape, level: u16) -> Self {
        Self {
            shape,
            level,
            buckets: vec![Bucket::new(); 1 << MIN_LOG2],
            log2: MIN_LOG2,
            entries: 0,
            collisions: 0,
            term: 0,
            nterm: 0,
            // A new table has never been generated.
            state: 1,
            opt_state: 0,
        }
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn log2(&self) -> u32 {
        self.log2
    }

    /// Number of unique values in the table.
    #[inline]
    pub fn entries(&self) -> u32 {
        self.entries
    }

    #[inline]
    pub fn collisions(&self) -> u32 {
        self.collisions
    }

    #[inline]
    pub fn term(&self) -> u32 {
        self.term
    }

    #[inline]
    pub fn nterm(&self) -> u32 {
        self.nterm
    }

    #[inline]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashEntry> {
        self.buckets.iter().flatten()
    }

    pub fn lookup(&self, value: u32) -> Option<AtomId> {
        self.buckets[bucket_index(value, self.log2)]
            .iter()
            .find(|entry| entry.value == value)
            .map(|entry| entry.atom)
    }

    /// The remaining entry of a table that is down to one value.
    pub fn sole_entry(&self) -> Option<AtomId> {
        if self.entries == 1 {
            self.iter().next().map(|entry| entry.atom)
        } else {
            None
        }
    }

    /// Add a new value. The value must not already be present.
    pub fn insert(&mut self, value: u32, atom: AtomId) {
        debug_assert!(self.lookup(value).is_none(), "duplicate hash value {value:#x}");
        if (self.buckets.len() * 3) < (self.entries as usize + 1) * 4 {
            self.grow();
        }
        self.place(HashEntry { value, atom });
        self.entries += 1;
        self.state += 1;
    }

    pub fn remove(&mut self, value: u32) -> Option<AtomId> {
        let bucket = &mut self.buckets[bucket_index(value, self.log2)];
        let pos = bucket.iter().position(|entry| entry.value == value)?;
        let entry = bucket.remove(pos);
        if !bucket.is_empty() {
            self.collisions -= 1;
        }
        self.entries -= 1;
        self.state += 1;
        Some(entry.atom)
    }

    /// Account for one more filter crossing this table.
    pub fn count_filter(&mut self, terminal: bool) {
        if terminal {
            self.term += 1;
        } else {
            self.nterm += 1;
        }
    }

    /// Take over the filter counts of an atom moved into the table.
    pub fn add_counts(&mut self, term: u32, nterm: u32) {
        self.term += term;
        self.nterm += nterm;
    }

    /// Account for one fewer filter crossing this table.
    pub fn uncount_filter(&mut self, terminal: bool) {
        if terminal {
            self.term -= 1;
        } else {
            self.nterm -= 1;
        }
    }

    /// Whether the table changed since the dispatcher last snapshotted it.
    #[inline]
    pub fn needs_regen(&self) -> bool {
        self.state != self.opt_state
    }

    pub fn mark_generated(&mut self) {
        self.opt_state = self.state;
    }

    /// Count colliding entries from the bucket contents.
    pub fn recount_collisions(&self) -> u32 {
        self.buckets
            .iter()
            .map(|bucket| u32::try_from(bucket.len().saturating_sub(1)).unwrap_or(u32::MAX))
            .sum()
    }

    fn place(&mut self, entry: HashEntry) {
        let bucket = &mut self.buckets[bucket_index(entry.value, self.log2)];
        if !bucket.is_empty() {
            self.collisions += 1;
        }
        bucket.push(entry);
    }

    fn grow(&mut self) {
        self.log2 += 1;
        tracing::trace!(
            offset = self.shape.offset,
            level = self.level,
            size = 1usize << self.log2,
            "growing hash table"
        );
        let old = std::mem::replace(&mut self.buckets, vec![Bucket::new(); 1 << self.log2]);
        self.collisions = 0;
        for entry in old.into_iter().flatten() {
            self.place(entry);
        }
    }
}
