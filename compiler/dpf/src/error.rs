//! Errors reported by [`Classifier`](crate::Classifier) operations.
//!
//! Every failing operation leaves the classifier exactly as it was.

use dpf_ir::{BogusReason, ProgramError};

use crate::pid::FilterId;

/// Why a filter could not be inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InsertError {
    #[error("filter program has no steps")]
    NilFilter,
    #[error("filter program has {len} steps, at most {max} are allowed")]
    TooManyElems { len: usize, max: usize },
    #[error("all {capacity} filter handles are in use")]
    TooManyFilters { capacity: u32 },
    #[error("step {level} is malformed: {reason}")]
    BogusOp { level: usize, reason: BogusReason },
    #[error("filter is identical to active filter {existing}")]
    Overlap { existing: FilterId },
}

impl From<ProgramError> for InsertError {
    fn from(err: ProgramError) -> Self {
        match err {
            ProgramError::Empty => Self::NilFilter,
            ProgramError::TooLong { len, max } => Self::TooManyElems { len, max },
            ProgramError::Bogus { level, reason } => Self::BogusOp { level, reason },
        }
    }
}

/// Why a filter could not be deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeleteError {
    #[error("no active filter has handle {0}")]
    BogusId(FilterId),
}
