//! Consistency checking.
//!
//! [`check`] re-derives every structural invariant of a classifier from
//! scratch and reports each one that does not hold. It walks the whole trie,
//! so it belongs in tests and debugging sessions, not on the dispatch path.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::dispatch::{compile_block, Dispatcher};
use crate::pid::{FilterId, PidAllocator};
use crate::trie::{Atom, AtomId, Rank, Trie};

/// An invariant that does not hold.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("{atom}: refcount {refcnt}, but {expected} filters pass through it")]
    Refcount {
        atom: AtomId,
        refcnt: u32,
        expected: u32,
    },
    #[error("{atom}: live atom with refcount 0")]
    DeadAtom { atom: AtomId },
    #[error("{atom}: not reachable from the root")]
    Unreachable { atom: AtomId },
    #[error("{atom}: parent link is {recorded:?}, but it hangs under {actual}")]
    ParentLink {
        atom: AtomId,
        recorded: Option<AtomId>,
        actual: AtomId,
    },
    #[error("{parent}: or-list position {position} does not rank before its successor")]
    OrListOrder { parent: AtomId, position: usize },
    #[error("{parent}: {count} plain same-shape equality alternatives reach the hash threshold")]
    Unhashed { parent: AtomId, count: usize },
    #[error("{atom}: hashed atom also has or-list members or a pid")]
    HashedShape { atom: AtomId },
    #[error("{atom}: hash counts term {term} + nterm {nterm} differ from refcount {refcnt}")]
    HashCounts {
        atom: AtomId,
        term: u32,
        nterm: u32,
        refcnt: u32,
    },
    #[error("{atom}: table records {recorded} entries, holds {actual}")]
    HashEntries {
        atom: AtomId,
        recorded: u32,
        actual: u32,
    },
    #[error("{atom}: table records {recorded} collisions, holds {actual}")]
    HashCollisions {
        atom: AtomId,
        recorded: u32,
        actual: u32,
    },
    #[error("{atom}: table entry for {value:#x} leads to an atom testing something else")]
    HashEntryValue { atom: AtomId, value: u32 },
    #[error("{atom}: hash table with {entries} entries should have been demoted")]
    Underfull { atom: AtomId, entries: u32 },
    #[error("filter {pid}: recorded tail {atom} does not carry it")]
    ActiveTail { pid: FilterId, atom: AtomId },
    #[error("{atom}: carries filter {pid}, which is not active")]
    StrayPid { atom: AtomId, pid: FilterId },
    #[error("{in_use} handles allocated for {active} active filters")]
    HandleLeak { in_use: u32, active: u32 },
    #[error("{atom}: generated code is out of date")]
    StaleCode { atom: AtomId },
    #[error("{atom}: code block outlived its atom")]
    OrphanCode { atom: AtomId },
}

/// Everything [`check`] inspects.
pub(crate) struct CheckCtx<'a> {
    pub trie: &'a Trie,
    pub dispatcher: &'a Dispatcher,
    pub active: &'a FxHashMap<FilterId, AtomId>,
    pub pids: &'a PidAllocator,
    pub hash_threshold: usize,
}

/// Collect every violated invariant.
pub(crate) fn check(ctx: &CheckCtx<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();
    let trie = ctx.trie;

    let reachable = check_structure(trie, ctx.hash_threshold, &mut violations);
    for id in trie.ids() {
        if !reachable.contains(&id) {
            violations.push(Violation::Unreachable { atom: id });
        }
    }

    check_filters(ctx, &mut violations);
    check_code(ctx, &mut violations);
    violations
}

/// Walk the trie from the root checking per-atom invariants. Returns the
/// set of atoms reached.
fn check_structure(
    trie: &Trie,
    hash_threshold: usize,
    violations: &mut Vec<Violation>,
) -> FxHashSet<AtomId> {
    let mut reachable = FxHashSet::default();
    let mut stack = vec![AtomId::ROOT];
    while let Some(id) = stack.pop() {
        if !reachable.insert(id) {
            continue;
        }
        let atom = &trie[id];
        let children = trie.children(id);

        for &kid in &children {
            match trie.get(kid) {
                Some(child) if child.parent != Some(id) => {
                    violations.push(Violation::ParentLink {
                        atom: kid,
                        recorded: child.parent,
                        actual: id,
                    });
                }
                _ => {}
            }
        }

        let expected = children
            .iter()
            .filter_map(|&kid| trie.get(kid))
            .map(|child| child.refcnt)
            .sum::<u32>()
            + u32::from(atom.pid.is_some());
        if atom.refcnt != expected {
            violations.push(Violation::Refcount {
                atom: id,
                refcnt: atom.refcnt,
                expected,
            });
        }
        if atom.refcnt == 0 && id != AtomId::ROOT {
            violations.push(Violation::DeadAtom { atom: id });
        }

        let keys: SmallVec<[Option<Rank>; 8]> = atom
            .kids
            .iter()
            .map(|&kid| trie.get(kid).map(Atom::rank))
            .collect();
        for (position, pair) in keys.windows(2).enumerate() {
            if let [Some(first), Some(second)] = *pair {
                if first >= second {
                    violations.push(Violation::OrListOrder {
                        parent: id,
                        position,
                    });
                }
            }
        }
        check_unhashed(trie, id, hash_threshold, violations);

        if let Some(table) = atom.table() {
            if !atom.kids.is_empty() || atom.pid.is_some() {
                violations.push(Violation::HashedShape { atom: id });
            }
            if table.term() + table.nterm() != atom.refcnt {
                violations.push(Violation::HashCounts {
                    atom: id,
                    term: table.term(),
                    nterm: table.nterm(),
                    refcnt: atom.refcnt,
                });
            }
            let actual = u32::try_from(table.iter().count()).unwrap_or(u32::MAX);
            if table.entries() != actual {
                violations.push(Violation::HashEntries {
                    atom: id,
                    recorded: table.entries(),
                    actual,
                });
            }
            if table.collisions() != table.recount_collisions() {
                violations.push(Violation::HashCollisions {
                    atom: id,
                    recorded: table.collisions(),
                    actual: table.recount_collisions(),
                });
            }
            if table.entries() < 2 {
                violations.push(Violation::Underfull {
                    atom: id,
                    entries: table.entries(),
                });
            }
            for entry in table.iter() {
                let consistent = trie.get(entry.atom).and_then(|a| a.step()).is_some_and(|s| {
                    s.shape == table.shape() && s.value() == Some(entry.value)
                });
                if !consistent {
                    violations.push(Violation::HashEntryValue {
                        atom: id,
                        value: entry.value,
                    });
                }
            }
        }

        stack.extend(children.into_iter().filter(|&kid| trie.get(kid).is_some()));
    }
    reachable
}

/// Same-shape equality alternatives must be hashed once there are enough of
/// them.
fn check_unhashed(
    trie: &Trie,
    id: AtomId,
    hash_threshold: usize,
    violations: &mut Vec<Violation>,
) {
    let mut by_shape: FxHashMap<dpf_ir::Shape, usize> = FxHashMap::default();
    for &kid in &trie[id].kids {
        let step = trie.get(kid).and_then(Atom::step);
        if let Some(step) = step.filter(|step| step.is_eq()) {
            *by_shape.entry(step.shape).or_default() += 1;
        }
    }
    for count in by_shape.into_values() {
        if count >= hash_threshold {
            violations.push(Violation::Unhashed { parent: id, count });
        }
    }
}

fn check_filters(ctx: &CheckCtx<'_>, violations: &mut Vec<Violation>) {
    let trie = ctx.trie;
    for (&pid, &atom) in ctx.active {
        if trie.get(atom).and_then(|a| a.pid) != Some(pid) {
            violations.push(Violation::ActiveTail { pid, atom });
        }
    }
    for id in trie.ids() {
        if let Some(pid) = trie[id].pid {
            if ctx.active.get(&pid) != Some(&id) {
                violations.push(Violation::StrayPid { atom: id, pid });
            }
        }
    }
    // The root holds one handle of its own.
    let active = u32::try_from(ctx.active.len()).unwrap_or(u32::MAX);
    if ctx.pids.in_use() != active + 1 {
        violations.push(Violation::HandleLeak {
            in_use: ctx.pids.in_use(),
            active,
        });
    }
}

fn check_code(ctx: &CheckCtx<'_>, violations: &mut Vec<Violation>) {
    let trie = ctx.trie;
    for id in trie.ids() {
        let fresh = compile_block(trie, id);
        let stale_table = trie[id].table().is_some_and(|table| table.needs_regen());
        if ctx.dispatcher.block(id) != Some(&fresh) || stale_table {
            violations.push(Violation::StaleCode { atom: id });
        }
    }
    for raw in 0..trie.slots() {
        let id = AtomId::new(u32::try_from(raw).unwrap_or(u32::MAX));
        if trie.get(id).is_none() && ctx.dispatcher.block(id).is_some() {
            violations.push(Violation::OrphanCode { atom: id });
        }
    }
}
