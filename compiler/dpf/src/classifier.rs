//! The classifier: filter registration and message dispatch.

use std::borrow::Cow;

use dpf_ir::Program;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::config::{DpfConfig, RebuildPolicy};
use crate::diagnostics::{check, CheckCtx, Violation};
use crate::dispatch::Dispatcher;
use crate::dump::Dump;
use crate::error::{DeleteError, InsertError};
use crate::pid::{FilterId, PidAllocator};
use crate::trie::{AtomId, Merge, Trie, Unmerge};

/// A set of active filters compiled into one discrimination trie.
///
/// Inserting and deleting filters takes `&mut self`; dispatching a message
/// takes `&self`. Wrap the classifier in a
/// [`SharedClassifier`](crate::SharedClassifier) to dispatch from several
/// threads while another one updates the filter set.
///
/// ```
/// use dpf::Classifier;
/// use dpf_ir::ProgramBuilder;
///
/// let mut dpf = Classifier::new();
/// let udp = dpf
///     .insert(&ProgramBuilder::new().eq16(12, 0x0800).eq8(23, 17).finish())
///     .unwrap();
///
/// let mut frame = [0u8; 64];
/// frame[12] = 0x08;
/// frame[23] = 17;
/// assert_eq!(dpf.dispatch(&frame), Some(udp));
/// ```
#[derive(Clone, Debug)]
pub struct Classifier {
    config: DpfConfig,
    trie: Trie,
    pids: PidAllocator,
    /// Tail atom of every active filter.
    active: FxHashMap<FilterId, AtomId>,
    dispatcher: Dispatcher,
    verbose: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Create an empty classifier with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DpfConfig::default())
    }

    /// Create an empty classifier. Degenerate settings are clamped, see
    /// [`DpfConfig::normalized`].
    pub fn with_config(config: DpfConfig) -> Self {
        let config = config.normalized();
        let mut trie = Trie::new();
        let mut pids = PidAllocator::new(config.max_filters);
        let root = pids.allocate();
        debug_assert_eq!(root, Some(FilterId::ROOT));
        let mut dispatcher = Dispatcher::default();
        dispatcher.rebuild(&mut trie);
        Self {
            config,
            trie,
            pids,
            active: FxHashMap::default(),
            dispatcher,
            verbose: false,
        }
    }

    #[inline]
    pub fn config(&self) -> &DpfConfig {
        &self.config
    }

    /// Add a filter and return its handle.
    ///
    /// A program that shares a prefix with active filters shares their trie
    /// atoms; only the unmatched remainder is allocated. A program identical
    /// to an active filter is rejected with [`InsertError::Overlap`]. A
    /// program that is a strict prefix of active filters is accepted, and
    /// messages matching it but none of the longer filters go to it.
    pub fn insert(&mut self, program: &Program) -> Result<FilterId, InsertError> {
        program.validate(self.config.max_elems)?;
        let program = if self.config.coalesce {
            Cow::Owned(dpf_ir::coalesce(program))
        } else {
            Cow::Borrowed(program)
        };

        let pid = self.pids.allocate().ok_or(InsertError::TooManyFilters {
            capacity: self.pids.capacity(),
        })?;

        match self
            .trie
            .merge(program.steps(), pid, self.config.hash_threshold)
        {
            Merge::Overlap { existing } => {
                self.pids.free(pid);
                tracing::debug!(%existing, "rejected duplicate filter");
                Err(InsertError::Overlap { existing })
            }
            Merge::Added {
                tail,
                dirty,
                created,
            } => {
                for &id in &dirty {
                    self.dispatcher.regenerate(&mut self.trie, id);
                }
                self.active.insert(pid, tail);
                tracing::debug!(
                    %pid,
                    %tail,
                    steps = program.len(),
                    created,
                    regenerated = dirty.len(),
                    "inserted filter"
                );
                self.trace_dump();
                Ok(pid)
            }
        }
    }

    /// Remove an active filter, returning its handle.
    ///
    /// Atoms no other filter uses are released, and the handle becomes
    /// available to later inserts.
    pub fn delete(&mut self, pid: FilterId) -> Result<FilterId, DeleteError> {
        let Some(&tail) = self.active.get(&pid) else {
            return Err(DeleteError::BogusId(pid));
        };

        let Unmerge { dirty, released } = self.trie.unmerge(tail);
        for &id in &released {
            self.dispatcher.discard(id);
        }
        match self.config.rebuild {
            RebuildPolicy::Full => self.dispatcher.rebuild(&mut self.trie),
            RebuildPolicy::Incremental => {
                for &id in &dirty {
                    self.dispatcher.regenerate(&mut self.trie, id);
                }
            }
        }

        self.active.remove(&pid);
        self.pids.free(pid);
        tracing::debug!(
            %pid,
            released = released.len(),
            regenerated = dirty.len(),
            "deleted filter"
        );
        self.trace_dump();
        Ok(pid)
    }

    /// Classify a message: the handle of the filter it matches, if any.
    ///
    /// When several filters match, compare them at the first step where
    /// they differ. If one of them ends there, the longer one wins.
    /// Otherwise the step that tests more bits wins; ties go to the lower
    /// field offset, then the narrower field, then the smaller mask, then
    /// equality before shift and the smaller shift amount. Length only
    /// matters along a shared path: a short filter beats a longer one that
    /// leaves it on a less specific test.
    #[inline]
    pub fn dispatch(&self, msg: &[u8]) -> Option<FilterId> {
        self.dispatcher.run(msg)
    }

    /// Classify many messages in parallel. Results are in input order.
    pub fn dispatch_batch<M>(&self, msgs: &[M]) -> Vec<Option<FilterId>>
    where
        M: AsRef<[u8]> + Sync,
    {
        msgs.par_iter()
            .map(|msg| self.dispatcher.run(msg.as_ref()))
            .collect()
    }

    /// Log the whole trie at `debug` level after every insert and delete.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Render the trie, one atom per line.
    pub fn dump(&self) -> String {
        Dump(&self.trie).to_string()
    }

    /// Re-derive every structural invariant and report those that fail.
    pub fn check_consistency(&self) -> Result<(), Vec<Violation>> {
        let violations = check(&CheckCtx {
            trie: &self.trie,
            dispatcher: &self.dispatcher,
            active: &self.active,
            pids: &self.pids,
            hash_threshold: self.config.hash_threshold,
        });
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Number of live atoms, not counting the root.
    #[inline]
    pub fn atom_count(&self) -> usize {
        self.trie.len()
    }

    /// Number of active filters.
    #[inline]
    pub fn active_filters(&self) -> usize {
        self.active.len()
    }

    /// Number of allocated handles, the root's included.
    #[inline]
    pub fn pids_in_use(&self) -> u32 {
        self.pids.in_use()
    }

    #[inline]
    pub fn contains(&self, pid: FilterId) -> bool {
        self.active.contains_key(&pid)
    }

    /// Refcounts along the path of `pid`, from the first step below the root
    /// to the filter's last step. Hashed atoms are skipped, so there is one
    /// value per merged step.
    pub fn path_refcnts(&self, pid: FilterId) -> Option<Vec<u32>> {
        let &tail = self.active.get(&pid)?;
        let mut refcnts: Vec<u32> = self
            .trie
            .path_to_root(tail)
            .into_iter()
            .map(|id| &self.trie[id])
            .filter(|atom| atom.step().is_some())
            .map(|atom| atom.refcnt)
            .collect();
        refcnts.reverse();
        Some(refcnts)
    }

    fn trace_dump(&self) {
        if self.verbose {
            tracing::debug!(atoms = self.trie.len(), "trie:\n{}", Dump(&self.trie));
        }
    }
}

#[cfg(test)]
mod tests;
