//! Thread-safe shared classifier.
//!
//! The classifier itself is not reentrant: a dispatch must never observe a
//! half-applied insert or delete. [`SharedClassifier`] puts it behind a
//! `parking_lot::RwLock` so any number of threads can dispatch while updates
//! are serialized.

use std::fmt;
use std::sync::Arc;

use dpf_ir::Program;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::classifier::Classifier;
use crate::error::{DeleteError, InsertError};
use crate::pid::FilterId;

/// Cheaply cloneable handle to a classifier shared between threads.
pub struct SharedClassifier(Arc<RwLock<Classifier>>);

impl SharedClassifier {
    pub fn new(classifier: Classifier) -> Self {
        SharedClassifier(Arc::new(RwLock::new(classifier)))
    }

    /// Get read access to the classifier.
    pub fn read(&self) -> RwLockReadGuard<'_, Classifier> {
        self.0.read()
    }

    /// Get write access to the classifier.
    pub fn write(&self) -> RwLockWriteGuard<'_, Classifier> {
        self.0.write()
    }

    pub fn insert(&self, program: &Program) -> Result<FilterId, InsertError> {
        self.0.write().insert(program)
    }

    pub fn delete(&self, pid: FilterId) -> Result<FilterId, DeleteError> {
        self.0.write().delete(pid)
    }

    pub fn dispatch(&self, msg: &[u8]) -> Option<FilterId> {
        self.0.read().dispatch(msg)
    }

    /// Classify a batch under a single read lock.
    pub fn dispatch_batch<M>(&self, msgs: &[M]) -> Vec<Option<FilterId>>
    where
        M: AsRef<[u8]> + Sync,
    {
        self.0.read().dispatch_batch(msgs)
    }
}

impl Default for SharedClassifier {
    fn default() -> Self {
        Self::new(Classifier::new())
    }
}

impl Clone for SharedClassifier {
    fn clone(&self) -> Self {
        SharedClassifier(Arc::clone(&self.0))
    }
}

impl fmt::Debug for SharedClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedClassifier({:?})", &*self.0.read())
    }
}
