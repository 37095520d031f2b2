//! Merging a filter program into the trie.
//!
//! # Algorithm
//!
//! 1. **Descend**: starting at the root, follow the child whose step is
//!    structurally equal to the next program step (or the table entry with
//!    the step's value, when a hashed atom covers the step's shape). Stop at
//!    the first step with no match. Nothing is modified in this phase, so a
//!    duplicate program is detected before any state changes.
//! 2. **Graft**: build a fresh chain for the unmatched remainder and link it
//!    in, either as a new table entry or as a new or-list member. If the
//!    or-list now holds `hash_threshold` same-shape equality alternatives,
//!    promote them into a hashed atom first.
//! 3. **Count**: increment refcounts from the root down to the tail, keep
//!    hash table filter counts in step, and mark the tail with the filter id.
//!
//! Every atom whose generated code may have changed is reported back in
//! [`Merge::Added::dirty`].

use dpf_ir::Step;
use smallvec::SmallVec;

use super::{Atom, AtomId, AtomKind, Trie};
use crate::hash::HashTable;
use crate::pid::FilterId;

/// Outcome of [`Trie::merge`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Merge {
    /// The program ends at an atom that already carries `existing`.
    /// The trie was not modified.
    Overlap { existing: FilterId },
    /// The program was merged and ends at `tail`.
    Added {
        tail: AtomId,
        /// Atoms whose code must be regenerated, sorted and deduplicated.
        dirty: Vec<AtomId>,
        /// Atoms created by this merge.
        created: usize,
    },
}

/// Where the read-only descent stopped.
enum Stop {
    /// Every step matched an existing atom.
    Exhausted,
    /// No alternative in the or-list of the last atom matched.
    OrList,
    /// The last atom is hashed and has no entry for the step's value.
    HashMiss,
}

struct Descent {
    /// Atoms matched so far, starting with the root.
    path: Vec<AtomId>,
    /// The atom the descent stopped at.
    at: AtomId,
    /// Number of program steps matched.
    matched: usize,
    stop: Stop,
}

enum Found {
    Child(AtomId),
    Entry { hashed: AtomId, entry: AtomId },
    TableMiss(AtomId),
    Nothing,
}

impl Trie {
    /// Merge `steps` into the trie as the filter `pid`.
    ///
    /// `steps` must be non-empty and valid; the classifier validates before
    /// calling.
    pub(crate) fn merge(&mut self, steps: &[Step], pid: FilterId, hash_threshold: usize) -> Merge {
        debug_assert!(!steps.is_empty(), "merging an empty program");

        let Descent {
            mut path,
            at,
            matched,
            stop,
        } = self.descend(steps);
        let rest = &steps[matched..];
        let mut dirty = Vec::new();
        let mut created = 0;

        match stop {
            Stop::Exhausted => {
                if let Some(existing) = self[at].pid {
                    return Merge::Overlap { existing };
                }
            }
            Stop::HashMiss => {
                let chain = self.graft_entry(at, rest);
                created = chain.len();
                dirty.push(at);
                dirty.extend_from_slice(&chain);
                path.extend(chain);
            }
            Stop::OrList => {
                let mut parent = at;
                if let Some(siblings) = self.promotion_candidates(at, &rest[0], hash_threshold) {
                    let hashed = self.promote(at, &siblings, &rest[0]);
                    created += 1;
                    dirty.push(at);
                    dirty.push(hashed);
                    dirty.extend_from_slice(&siblings);
                    path.push(hashed);
                    parent = hashed;
                }
                let chain = if self[parent].table().is_some() {
                    self.graft_entry(parent, rest)
                } else {
                    let chain = self.grow_chain(parent, rest);
                    self.link_ordered(parent, chain[0]);
                    chain
                };
                created += chain.len();
                dirty.push(parent);
                dirty.extend_from_slice(&chain);
                path.extend(chain);
            }
        }

        let tail = path[path.len() - 1];
        self.count_path(&path, tail, &mut dirty);
        self[tail].pid = Some(pid);
        dirty.push(tail);

        dirty.sort_unstable();
        dirty.dedup();
        Merge::Added {
            tail,
            dirty,
            created,
        }
    }

    fn descend(&self, steps: &[Step]) -> Descent {
        let mut path = vec![AtomId::ROOT];
        let mut at = AtomId::ROOT;
        for (matched, step) in steps.iter().enumerate() {
            match self.find_child(at, step) {
                Found::Child(kid) => {
                    path.push(kid);
                    at = kid;
                }
                Found::Entry { hashed, entry } => {
                    path.push(hashed);
                    path.push(entry);
                    at = entry;
                }
                Found::TableMiss(hashed) => {
                    path.push(hashed);
                    return Descent {
                        path,
                        at: hashed,
                        matched,
                        stop: Stop::HashMiss,
                    };
                }
                Found::Nothing => {
                    return Descent {
                        path,
                        at,
                        matched,
                        stop: Stop::OrList,
                    };
                }
            }
        }
        Descent {
            path,
            at,
            matched: steps.len(),
            stop: Stop::Exhausted,
        }
    }

    fn find_child(&self, at: AtomId, step: &Step) -> Found {
        for &kid in &self[at].kids {
            match &self[kid].kind {
                AtomKind::Test(existing) if existing.same_test(step) => return Found::Child(kid),
                AtomKind::Hashed(table) if step.is_eq() && table.shape() == step.shape => {
                    return match step.value().and_then(|value| table.lookup(value)) {
                        Some(entry) => Found::Entry { hashed: kid, entry },
                        None => Found::TableMiss(kid),
                    };
                }
                AtomKind::Root | AtomKind::Test(_) | AtomKind::Hashed(_) => {}
            }
        }
        Found::Nothing
    }

    /// Create unlinked atoms for `steps`, each the only child of the one
    /// before. The first atom's parent is set to `parent` but the caller
    /// links it in.
    fn grow_chain(&mut self, parent: AtomId, steps: &[Step]) -> Vec<AtomId> {
        let mut chain = Vec::with_capacity(steps.len());
        let mut up = parent;
        for step in steps {
            let id = self.alloc(Atom::new(AtomKind::Test(*step), up));
            if up != parent {
                self[up].kids.push(id);
            }
            chain.push(id);
            up = id;
        }
        chain
    }

    /// Grow a chain for `steps` and file its head under the hashed atom
    /// `hashed`, keyed by the first step's value.
    fn graft_entry(&mut self, hashed: AtomId, steps: &[Step]) -> Vec<AtomId> {
        let chain = self.grow_chain(hashed, steps);
        let head = chain[0];
        let value = steps[0].value();
        if let (Some(value), Some(table)) = (value, self[hashed].table_mut()) {
            table.insert(value, head);
        }
        chain
    }

    /// The same-shape equality siblings of `step` under `parent`, if adding
    /// `step` would bring their number to `threshold`.
    fn promotion_candidates(
        &self,
        parent: AtomId,
        step: &Step,
        threshold: usize,
    ) -> Option<SmallVec<[AtomId; 8]>> {
        if !step.is_eq() {
            return None;
        }
        let siblings: SmallVec<[AtomId; 8]> = self[parent]
            .kids
            .iter()
            .copied()
            .filter(|&kid| {
                self[kid]
                    .step()
                    .is_some_and(|s| s.is_eq() && s.shape == step.shape)
            })
            .collect();
        (siblings.len() + 1 >= threshold).then_some(siblings)
    }

    /// Move `siblings` out of `parent`'s or-list into a new hashed atom.
    ///
    /// Same-shape equality siblings are adjacent in a ranked or-list and the
    /// hashed atom ranks into the gap they leave, so every other alternative
    /// keeps its place relative to the group.
    fn promote(&mut self, parent: AtomId, siblings: &[AtomId], step: &Step) -> AtomId {
        let mut table = HashTable::new(step.shape, step.level);
        let mut refcnt = 0;
        for &kid in siblings {
            let atom = &self[kid];
            if let Some(value) = atom.step().and_then(Step::value) {
                table.insert(value, kid);
            }
            refcnt += atom.refcnt;
            let ending = u32::from(atom.pid.is_some());
            table.add_counts(ending, atom.refcnt - ending);
        }
        let hashed = self.alloc(Atom {
            refcnt,
            ..Atom::new(AtomKind::Hashed(Box::new(table)), parent)
        });

        self[parent].kids.retain(|kid| !siblings.contains(kid));
        self.link_ordered(parent, hashed);
        for &kid in siblings {
            self[kid].parent = Some(hashed);
        }

        tracing::debug!(
            parent = %parent,
            hashed = %hashed,
            entries = siblings.len() + 1,
            offset = step.shape.offset,
            "promoted or-list to hash table"
        );
        hashed
    }

    /// Count one more filter along `path` (root first, `tail` last).
    fn count_path(&mut self, path: &[AtomId], tail: AtomId, dirty: &mut Vec<AtomId>) {
        for (i, &id) in path.iter().enumerate() {
            let below = path.get(i + 1).copied();
            let atom = &mut self[id];
            atom.refcnt += 1;
            if atom.refcnt == 2 {
                // No longer a private suffix: straight-line code is invalid,
                // and the atom below becomes the head of what remains.
                dirty.push(id);
                dirty.extend_from_slice(&atom.kids);
            }
            if let Some(table) = atom.table_mut() {
                table.count_filter(below == Some(tail));
                if table.needs_regen() {
                    dirty.push(id);
                }
            }
        }
    }
}
