//! Classifier configuration.

/// How the dispatcher is brought up to date after a delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RebuildPolicy {
    /// Recompile every code block reachable from the root.
    #[default]
    Full,
    /// Recompile only the blocks of atoms the delete touched.
    Incremental,
}

/// Tunable limits and policies of a [`Classifier`](crate::Classifier).
///
/// ```
/// use dpf::{DpfConfig, RebuildPolicy};
///
/// let config = DpfConfig::default()
///     .with_max_filters(256)
///     .with_rebuild(RebuildPolicy::Incremental);
/// assert_eq!(config.max_filters, 256);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DpfConfig {
    /// Size of the filter handle namespace, root handle included.
    pub max_filters: u32,
    /// Longest accepted program. Never more than [`dpf_ir::MAX_STEPS`].
    pub max_elems: usize,
    /// Number of same-shape equality alternatives that triggers hashing.
    pub hash_threshold: usize,
    /// Merge adjacent equality steps before inserting.
    pub coalesce: bool,
    pub rebuild: RebuildPolicy,
}

impl Default for DpfConfig {
    fn default() -> Self {
        Self {
            max_filters: 1024,
            max_elems: dpf_ir::MAX_STEPS,
            hash_threshold: 4,
            coalesce: false,
            rebuild: RebuildPolicy::Full,
        }
    }
}

impl DpfConfig {
    #[must_use]
    pub fn with_max_filters(mut self, max_filters: u32) -> Self {
        self.max_filters = max_filters;
        self
    }

    #[must_use]
    pub fn with_max_elems(mut self, max_elems: usize) -> Self {
        self.max_elems = max_elems;
        self
    }

    #[must_use]
    pub fn with_hash_threshold(mut self, hash_threshold: usize) -> Self {
        self.hash_threshold = hash_threshold;
        self
    }

    #[must_use]
    pub fn with_coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }

    #[must_use]
    pub fn with_rebuild(mut self, rebuild: RebuildPolicy) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Clamp values the engine cannot work with.
    ///
    /// A hash table needs at least two entries, and the handle namespace must
    /// hold the root plus at least one filter. Programs are capped at
    /// [`dpf_ir::MAX_STEPS`] steps, which bounds the depth of the trie and so
    /// the recursion of dispatch and dumping.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            max_filters: self.max_filters.max(2),
            max_elems: self.max_elems.min(dpf_ir::MAX_STEPS),
            hash_threshold: self.hash_threshold.max(2),
            ..self
        }
    }
}
