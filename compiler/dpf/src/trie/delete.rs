//! Removing a filter from the trie.
//!
//! Walking from the filter's tail to the root, every refcount drops by one.
//! The atoms that reach zero form a chain hanging from the tail; the topmost
//! of them is the *unlink point*, whose parent survives. Exactly one of three
//! structural cases applies there:
//!
//! - **Table entry**: drop it from the parent's hash table. A table left with
//!   a single entry is demoted: the entry is ranked back into the
//!   grandparent's or-list, where it lands in the hashed atom's place, and
//!   the hashed atom is released.
//! - **Or-list member**: drop it from the parent's or-list. The new first and
//!   last members are reported dirty along with the parent.
//! - **Only child**: the parent becomes a leaf (or keeps only its pid).
//!
//! If nothing reaches zero the tail is an interior atom shared with longer
//! filters and only loses its pid.

use super::{AtomId, Trie};

/// Outcome of [`Trie::unmerge`].
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Unmerge {
    /// Surviving atoms whose code must be regenerated, sorted and deduplicated.
    pub dirty: Vec<AtomId>,
    /// Atoms released by this delete, deepest first.
    pub released: Vec<AtomId>,
}

impl Trie {
    /// Remove one filter whose path ends at `tail`.
    pub(crate) fn unmerge(&mut self, tail: AtomId) -> Unmerge {
        let mut dirty = Vec::new();
        let mut doomed = Vec::new();
        self[tail].pid = None;

        let mut private = Vec::new();
        let mut below: Option<AtomId> = None;
        for id in self.path_to_root(tail) {
            let atom = &mut self[id];
            atom.refcnt -= 1;
            if let Some(table) = atom.table_mut() {
                table.uncount_filter(below == Some(tail));
            }
            match atom.refcnt {
                0 if id != AtomId::ROOT => doomed.push(id),
                // Back to a private suffix: straight-line code applies again.
                1 => {
                    dirty.push(id);
                    private.push(id);
                }
                _ => {}
            }
            below = Some(id);
        }

        match doomed.last() {
            Some(&top) => self.unlink(top, &mut dirty, &mut doomed),
            None => dirty.push(tail),
        }
        // The surviving atom below a newly private one is no longer a head.
        for id in private {
            if let Some(atom) = self.get(id) {
                dirty.extend_from_slice(&atom.kids);
            }
        }

        for &id in &doomed {
            self.release(id);
        }
        dirty.retain(|id| !doomed.contains(id));
        dirty.sort_unstable();
        dirty.dedup();
        Unmerge {
            dirty,
            released: doomed,
        }
    }

    fn unlink(&mut self, top: AtomId, dirty: &mut Vec<AtomId>, doomed: &mut Vec<AtomId>) {
        let Some(parent) = self[top].parent else {
            return;
        };
        let value = self[top].step().and_then(dpf_ir::Step::value);

        if let Some(table) = self[parent].table_mut() {
            if let Some(value) = value {
                table.remove(value);
            }
            let survivor = table.sole_entry();
            dirty.push(parent);
            if let Some(survivor) = survivor {
                self.demote(parent, survivor, dirty, doomed);
            }
            return;
        }

        let kids = &mut self[parent].kids;
        let Some(pos) = kids.iter().position(|&kid| kid == top) else {
            panic!("{top} missing from the or-list of its parent {parent}");
        };
        let was_last = pos + 1 == kids.len();
        kids.remove(pos);
        if pos == 0 {
            dirty.extend(kids.first().copied());
        }
        if was_last {
            dirty.extend(kids.last().copied());
        }
        dirty.push(parent);
    }

    /// Replace the hashed atom `hashed` by its last remaining entry.
    fn demote(
        &mut self,
        hashed: AtomId,
        survivor: AtomId,
        dirty: &mut Vec<AtomId>,
        doomed: &mut Vec<AtomId>,
    ) {
        let Some(grand) = self[hashed].parent else {
            return;
        };
        self[grand].kids.retain(|kid| *kid != hashed);
        self[survivor].parent = Some(grand);
        self.link_ordered(grand, survivor);
        doomed.push(hashed);
        dirty.push(survivor);
        dirty.push(grand);
        tracing::debug!(
            hashed = %hashed,
            survivor = %survivor,
            "demoted hash table to its last entry"
        );
    }
}
