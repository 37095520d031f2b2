//! Human-readable rendering of the trie.
//!
//! One line per atom, indented by depth. Hash table entries are listed in
//! ascending value order so the output does not depend on the bucket layout.
//!
//! ```text
//! a0 root refs=2
//!   a1 eq16 [12] & 0xffff == 0x800 refs=2
//!     a3 eq8 [23] & 0xff == 0x6 refs=1 pid=2
//!     a2 eq8 [23] & 0xff == 0x11 refs=1 pid=1
//! ```

use std::fmt;

use crate::trie::{AtomId, AtomKind, Trie};

/// Displays the trie rooted at [`AtomId::ROOT`].
pub(crate) struct Dump<'a>(pub &'a Trie);

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.atom(f, AtomId::ROOT, 0)
    }
}

impl Dump<'_> {
    fn atom(&self, f: &mut fmt::Formatter<'_>, id: AtomId, depth: usize) -> fmt::Result {
        let trie = self.0;
        let atom = &trie[id];
        write!(f, "{:indent$}{id} ", "", indent = depth * 2)?;
        match &atom.kind {
            AtomKind::Root => write!(f, "root")?,
            AtomKind::Test(step) => write!(f, "{step}")?,
            AtomKind::Hashed(table) => {
                let shape = table.shape();
                write!(
                    f,
                    "hash{} [{}] & {:#x} size={} entries={} collisions={} term={} nterm={}",
                    shape.width,
                    shape.offset,
                    shape.mask,
                    table.size(),
                    table.entries(),
                    table.collisions(),
                    table.term(),
                    table.nterm()
                )?;
            }
        }
        write!(f, " refs={}", atom.refcnt)?;
        if let Some(pid) = atom.pid {
            write!(f, " pid={pid}")?;
        }
        writeln!(f)?;

        let kids = match atom.table() {
            Some(table) => {
                let mut entries: Vec<_> = table.iter().collect();
                entries.sort_unstable_by_key(|entry| entry.value);
                entries.into_iter().map(|entry| entry.atom).collect()
            }
            None => atom.kids.to_vec(),
        };
        for kid in kids {
            self.atom(f, kid, depth + 1)?;
        }
        Ok(())
    }
}
