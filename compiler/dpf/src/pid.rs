//! Filter handle allocation.
//!
//! Handles come from a bounded namespace `[0, capacity)` tracked by a bitmap.
//! The bitmap is allocated on the first call to [`PidAllocator::allocate`], so
//! an idle classifier pays nothing for a large namespace. Allocation always
//! returns the lowest free handle, which keeps handles small and makes reuse
//! after deletion predictable.

use std::fmt;

/// Handle identifying an inserted filter.
///
/// Unrelated to operating-system process ids. Handle 0 belongs to the trie
/// root and is never returned by `insert`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FilterId(u32);

impl FilterId {
    /// The placeholder handle consumed by the trie root.
    pub const ROOT: Self = Self(0);

    /// Create a filter ID from a raw handle value.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const WORD_BITS: u32 = u64::BITS;

/// Bounded pool of filter handles.
#[derive(Clone, Debug)]
pub struct PidAllocator {
    capacity: u32,
    /// One bit per handle; `None` until the first allocation.
    words: Option<Vec<u64>>,
    in_use: u32,
}

impl PidAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            words: None,
            in_use: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of handles currently allocated.
    #[inline]
    pub fn in_use(&self) -> u32 {
        self.in_use
    }

    /// Allocate the lowest free handle, or `None` if all are in use.
    pub fn allocate(&mut self) -> Option<FilterId> {
        if self.in_use >= self.capacity {
            return None;
        }
        let capacity = self.capacity;
        let words = self.words.get_or_insert_with(|| {
            let len = capacity.div_ceil(WORD_BITS);
            vec![0; usize::try_from(len).unwrap_or(usize::MAX)]
        });
        for (index, word) in (0u32..).zip(words.iter_mut()) {
            if *word == u64::MAX {
                continue;
            }
            let bit = (!*word).trailing_zeros();
            let raw = index * WORD_BITS + bit;
            if raw >= capacity {
                return None;
            }
            *word |= 1 << bit;
            self.in_use += 1;
            return Some(FilterId(raw));
        }
        None
    }

    /// Return a handle to the pool. Returns `false` if it was not allocated.
    pub fn free(&mut self, id: FilterId) -> bool {
        let Some((word, bit)) = self.slot_mut(id) else {
            return false;
        };
        if *word & bit == 0 {
            return false;
        }
        *word &= !bit;
        self.in_use -= 1;
        true
    }

    pub fn is_allocated(&self, id: FilterId) -> bool {
        let (index, bit) = split(id);
        self.words
            .as_ref()
            .and_then(|words| words.get(index))
            .is_some_and(|word| word & bit != 0)
    }

    fn slot_mut(&mut self, id: FilterId) -> Option<(&mut u64, u64)> {
        if id.0 >= self.capacity {
            return None;
        }
        let (index, bit) = split(id);
        let word = self.words.as_mut()?.get_mut(index)?;
        Some((word, bit))
    }
}

fn split(id: FilterId) -> (usize, u64) {
    let index = usize::try_from(id.0 / WORD_BITS).unwrap_or(usize::MAX);
    (index, 1 << (id.0 % WORD_BITS))
}
