//! Code generation and dispatch.
//!
//! Every live atom has a [`CodeBlock`]: a self-contained snapshot of what the
//! dispatcher needs at that node (its test, the filter ending there, and how
//! to reach the next level). Dispatch only ever reads code blocks, never the
//! live trie, so a block that is not regenerated after the atom it was
//! compiled from changes produces wrong matches. The trie reports which atoms
//! changed on every insert and delete; [`Dispatcher::regenerate`] recompiles
//! exactly those, and [`Dispatcher::rebuild`] recompiles everything reachable
//! from the root.
//!
//! # Block shapes
//!
//! - `Leaf`: no children; the result is the block's pid.
//! - `Scan`: the or-list, tried in rank order with backtracking, falling
//!   back to the block's own pid.
//! - `Hash`: a copy of the hashed atom's buckets; one load, one lookup.
//! - `Chain`: an unshared suffix (refcount 1) compiled to straight-line
//!   code: a run of steps ending in a single pid, with no per-atom lookups.
//!   Only the topmost atom of the suffix gets one; the atoms below it are
//!   never entered and compile to plain `Scan`/`Leaf` blocks.

use dpf_ir::{Shape, Step};
use smallvec::SmallVec;

use crate::hash::{bucket_index, Bucket};
use crate::pid::FilterId;
use crate::trie::{AtomId, AtomKind, Trie};

/// Generated code for one atom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CodeBlock {
    /// The atom's own test. `None` for the root and hashed atoms.
    test: Option<Step>,
    pid: Option<FilterId>,
    next: Next,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Next {
    Leaf,
    Scan(SmallVec<[AtomId; 4]>),
    Hash {
        shape: Shape,
        log2: u32,
        buckets: Vec<Bucket>,
    },
    Chain {
        steps: SmallVec<[Step; 8]>,
        pid: FilterId,
    },
}

/// Compile the code block for `id` from the current trie.
pub(crate) fn compile_block(trie: &Trie, id: AtomId) -> CodeBlock {
    let atom = &trie[id];
    let next = match &atom.kind {
        AtomKind::Hashed(table) => Next::Hash {
            shape: table.shape(),
            log2: table.log2(),
            buckets: table.buckets().to_vec(),
        },
        AtomKind::Root | AtomKind::Test(_) if atom.kids.is_empty() => Next::Leaf,
        AtomKind::Root | AtomKind::Test(_) => {
            straight_line(trie, id).unwrap_or_else(|| Next::Scan(atom.kids.clone()))
        }
    };
    CodeBlock {
        test: atom.step().copied(),
        pid: atom.pid,
        next,
    }
}

/// Compile the private suffix below `id` into a single run of steps.
///
/// Applies only when exactly one filter passes through `id` and does not end
/// there, and the parent is shared; that filter's path below `id` is then a
/// plain chain.
fn straight_line(trie: &Trie, id: AtomId) -> Option<Next> {
    let start = &trie[id];
    if start.refcnt != 1 || start.pid.is_some() {
        return None;
    }
    if start.parent.is_some_and(|parent| trie[parent].refcnt == 1) {
        return None;
    }
    let mut steps = SmallVec::new();
    let mut at = id;
    loop {
        let atom = &trie[at];
        if let Some(pid) = atom.pid {
            return atom.kids.is_empty().then_some(Next::Chain { steps, pid });
        }
        let [kid] = atom.kids[..] else {
            return None;
        };
        steps.push(*trie[kid].step()?);
        at = kid;
    }
}

/// Code blocks indexed by atom.
#[derive(Clone, Debug, Default)]
pub(crate) struct Dispatcher {
    blocks: Vec<Option<CodeBlock>>,
}

impl Dispatcher {
    #[inline]
    pub fn block(&self, id: AtomId) -> Option<&CodeBlock> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_some()).count()
    }

    /// Recompile the block for `id` and record hash tables as generated.
    pub fn regenerate(&mut self, trie: &mut Trie, id: AtomId) {
        let block = compile_block(trie, id);
        if let Some(table) = trie[id].table_mut() {
            table.mark_generated();
        }
        tracing::trace!(atom = %id, "regenerated code block");
        let index = id.index();
        if self.blocks.len() <= index {
            self.blocks.resize(index + 1, None);
        }
        self.blocks[index] = Some(block);
    }

    /// Drop the block of a released atom.
    pub fn discard(&mut self, id: AtomId) {
        if let Some(slot) = self.blocks.get_mut(id.index()) {
            *slot = None;
        }
    }

    /// Throw every block away and recompile everything reachable from the
    /// root.
    pub fn rebuild(&mut self, trie: &mut Trie) {
        self.blocks.clear();
        let mut stack = vec![AtomId::ROOT];
        while let Some(id) = stack.pop() {
            stack.extend(trie.children(id));
            self.regenerate(trie, id);
        }
        tracing::debug!(blocks = self.len(), "rebuilt dispatcher");
    }

    /// Classify `msg`.
    pub fn run(&self, msg: &[u8]) -> Option<FilterId> {
        self.eval(AtomId::ROOT, msg, 0)
    }

    fn eval(&self, id: AtomId, msg: &[u8], base: usize) -> Option<FilterId> {
        let block = self.block(id)?;
        let base = match &block.test {
            Some(step) => step.run(msg, base)?,
            None => base,
        };
        match &block.next {
            Next::Leaf => block.pid,
            Next::Scan(kids) => kids
                .iter()
                .find_map(|&kid| self.eval(kid, msg, base))
                .or(block.pid),
            Next::Hash {
                shape,
                log2,
                buckets,
            } => {
                let value = shape.load(msg, base)?;
                buckets[bucket_index(value, *log2)]
                    .iter()
                    .find(|entry| entry.value == value)
                    .and_then(|entry| self.eval(entry.atom, msg, base))
            }
            Next::Chain { steps, pid } => {
                steps
                    .iter()
                    .try_fold(base, |base, step| step.run(msg, base))?;
                Some(*pid)
            }
        }
    }
}
