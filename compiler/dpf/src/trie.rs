//! The shared discrimination trie.
//!
//! Every filter is a path from the root: one atom per step. Filters that
//! begin with the same steps share the atoms for that prefix, and each atom
//! counts (`refcnt`) how many active filters pass through it.
//!
//! # Layout
//!
//! Atoms live in an arena ([`Trie`]) and refer to each other by [`AtomId`].
//! Released slots go on a free list and are reused by later inserts.
//!
//! - An atom's **or-list** (`kids`) holds the alternative tests one level
//!   down, ordered most-specific-first (see [`Rank`]).
//! - A **hashed atom** stands in for a group of equality siblings that share
//!   a field shape. It owns a [`HashTable`] mapping each comparison value to
//!   the entry atom carrying that value; its own or-list is always empty.
//! - `pid` marks the atom where a filter's path ends.
//!
//! Refcounts satisfy `refcnt == Σ refcnt(children) + pid.is_some()`, where
//! the children of a hashed atom are its table entries.
//!
//! Insertion lives in [`insert`](self::insert), deletion in
//! [`delete`](self::delete).

use std::cmp::Reverse;
use std::fmt;
use std::ops::{Index, IndexMut};

use dpf_ir::{Shape, Step, StepKind};
use smallvec::SmallVec;

use crate::hash::HashTable;
use crate::pid::FilterId;

mod delete;
mod insert;

pub(crate) use delete::Unmerge;
pub(crate) use insert::Merge;

/// Index of an atom in the trie arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct AtomId(u32);

impl AtomId {
    /// The synthetic root, present for the whole life of a trie.
    pub const ROOT: Self = Self(0);

    /// Create an atom ID from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// What an atom tests.
#[derive(Clone, Debug)]
pub(crate) enum AtomKind {
    /// The synthetic root. Tests nothing.
    Root,
    /// A single program step.
    Test(Step),
    /// A group of same-shape equality alternatives behind a hash table.
    Hashed(Box<HashTable>),
}

/// One trie node.
#[derive(Clone, Debug)]
pub(crate) struct Atom {
    pub kind: AtomKind,
    pub parent: Option<AtomId>,
    /// Or-list of alternatives one level down. Empty for hashed atoms.
    pub kids: SmallVec<[AtomId; 4]>,
    /// Number of active filters whose path includes this atom.
    pub refcnt: u32,
    /// Filter whose path ends here.
    pub pid: Option<FilterId>,
}

impl Atom {
    fn new(kind: AtomKind, parent: AtomId) -> Self {
        Self {
            kind,
            parent: Some(parent),
            kids: SmallVec::new(),
            refcnt: 0,
            pid: None,
        }
    }

    #[inline]
    pub fn step(&self) -> Option<&Step> {
        match &self.kind {
            AtomKind::Test(step) => Some(step),
            AtomKind::Root | AtomKind::Hashed(_) => None,
        }
    }

    #[inline]
    pub fn table(&self) -> Option<&HashTable> {
        match &self.kind {
            AtomKind::Hashed(table) => Some(table),
            AtomKind::Root | AtomKind::Test(_) => None,
        }
    }

    #[inline]
    pub fn table_mut(&mut self) -> Option<&mut HashTable> {
        match &mut self.kind {
            AtomKind::Hashed(table) => Some(table),
            AtomKind::Root | AtomKind::Test(_) => None,
        }
    }

    /// The number of message bits tested.
    pub fn specificity(&self) -> u32 {
        match &self.kind {
            AtomKind::Root => 0,
            AtomKind::Test(step) => step.specificity(),
            AtomKind::Hashed(table) => table.shape().mask.count_ones(),
        }
    }

    /// Ordering key for or-lists.
    pub fn rank(&self) -> Rank {
        let (shape, operand) = match &self.kind {
            AtomKind::Root => (None, None),
            AtomKind::Test(step) => {
                let operand = match step.kind {
                    StepKind::Eq { value } => (0, value),
                    StepKind::Shift { amount } => (1, u32::from(amount)),
                };
                (Some(step.shape), Some(operand))
            }
            AtomKind::Hashed(table) => (Some(table.shape()), None),
        };
        Rank {
            specificity: Reverse(self.specificity()),
            shape,
            operand,
        }
    }
}

/// Position of an alternative in its or-list; smaller sorts first.
///
/// Alternatives are ordered by the number of bits they test, highest first,
/// then by field shape, then by operation and operand. The order depends only
/// on the tests themselves, never on when they were inserted, so equality
/// tests on one field always sit next to each other and a hashed atom that
/// replaces them sorts into the same place. Hashing or unhashing a group
/// therefore never changes which alternative the dispatcher tries first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Rank {
    specificity: Reverse<u32>,
    shape: Option<Shape>,
    /// Operation tag (equality before shift) and value or shift amount.
    /// `None` for a hashed atom, which stands for every value of its shape.
    operand: Option<(u8, u32)>,
}

/// Arena of atoms rooted at [`AtomId::ROOT`].
#[derive(Clone, Debug)]
pub(crate) struct Trie {
    atoms: Vec<Option<Atom>>,
    free: Vec<AtomId>,
    /// Live atoms, not counting the root.
    live: usize,
}

impl Trie {
    pub fn new() -> Self {
        let root = Atom {
            kind: AtomKind::Root,
            parent: None,
            kids: SmallVec::new(),
            refcnt: 0,
            pid: None,
        };
        Self {
            atoms: vec![Some(root)],
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live atoms, excluding the root.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Total number of arena slots, live or free.
    #[inline]
    pub fn slots(&self) -> usize {
        self.atoms.len()
    }

    #[inline]
    pub fn get(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id.index()).and_then(Option::as_ref)
    }

    /// IDs of every live atom, root included.
    pub fn ids(&self) -> impl Iterator<Item = AtomId> + '_ {
        (0u32..)
            .zip(&self.atoms)
            .filter(|(_, slot)| slot.is_some())
            .map(|(raw, _)| AtomId(raw))
    }

    /// Children one level down: the or-list, or the table entries of a
    /// hashed atom.
    pub fn children(&self, id: AtomId) -> SmallVec<[AtomId; 8]> {
        let atom = &self[id];
        match atom.table() {
            Some(table) => table.iter().map(|entry| entry.atom).collect(),
            None => atom.kids.iter().copied().collect(),
        }
    }

    /// Atoms from `id` up to and including the root.
    pub fn path_to_root(&self, id: AtomId) -> Vec<AtomId> {
        let mut path = vec![id];
        let mut at = id;
        while let Some(parent) = self[at].parent {
            path.push(parent);
            at = parent;
        }
        path
    }

    fn alloc(&mut self, atom: Atom) -> AtomId {
        self.live += 1;
        if let Some(id) = self.free.pop() {
            self.atoms[id.index()] = Some(atom);
            return id;
        }
        let id = AtomId(u32::try_from(self.atoms.len()).unwrap_or(u32::MAX));
        self.atoms.push(Some(atom));
        id
    }

    fn release(&mut self, id: AtomId) {
        debug_assert_ne!(id, AtomId::ROOT, "the root is never released");
        if self.atoms[id.index()].take().is_some() {
            self.live -= 1;
            self.free.push(id);
        }
    }

    /// Link `kid` into `parent`'s or-list at the position given by its
    /// [`Rank`].
    ///
    /// The dispatcher scans in this order and takes the first alternative
    /// that leads to a match, so a test on more bits takes priority over a
    /// test on fewer bits at the same depth.
    fn link_ordered(&mut self, parent: AtomId, kid: AtomId) {
        let key = self[kid].rank();
        let pos = self[parent]
            .kids
            .iter()
            .position(|&sibling| self[sibling].rank() > key)
            .unwrap_or(self[parent].kids.len());
        self[parent].kids.insert(pos, kid);
    }
}

impl Index<AtomId> for Trie {
    type Output = Atom;

    fn index(&self, id: AtomId) -> &Atom {
        match self.atoms.get(id.index()) {
            Some(Some(atom)) => atom,
            _ => panic!("use of released atom {id}"),
        }
    }
}

impl IndexMut<AtomId> for Trie {
    fn index_mut(&mut self, id: AtomId) -> &mut Atom {
        match self.atoms.get_mut(id.index()) {
            Some(Some(atom)) => atom,
            _ => panic!("use of released atom {id}"),
        }
    }
}
