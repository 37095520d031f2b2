//! Filter programs and their validation.

use crate::step::{Step, StepKind, Width};
use crate::MESSAGE_ALIGN;

/// An ordered sequence of steps; the end of the sequence is the end marker.
///
/// Every step is annotated with its level and alignment hint when the program
/// is constructed, so a `Program` is always internally consistent even when it
/// was assembled from raw [`Step`]s by an external translator. Whether the
/// steps are *well-formed* is a separate question answered by
/// [`Program::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Program {
    steps: Vec<Step>,
}

impl Program {
    /// Build a program from raw steps, renumbering levels and recomputing
    /// alignment hints.
    pub fn from_steps(mut steps: Vec<Step>) -> Self {
        annotate(&mut steps);
        Self { steps }
    }

    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check that the program can be merged into a classifier.
    ///
    /// A program must be non-empty, hold at most `max_steps` steps, and every
    /// step must be well-formed: the mask fits the field width, an equality
    /// value has no bits outside the mask, and a shift amount is below 32.
    pub fn validate(&self, max_steps: usize) -> Result<(), ProgramError> {
        if self.steps.is_empty() {
            return Err(ProgramError::Empty);
        }
        if self.steps.len() > max_steps {
            return Err(ProgramError::TooLong {
                len: self.steps.len(),
                max: max_steps,
            });
        }
        for (level, step) in self.steps.iter().enumerate() {
            if let Some(reason) = check_step(step) {
                return Err(ProgramError::Bogus { level, reason });
            }
        }
        Ok(())
    }
}

/// Why a step is malformed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BogusReason {
    #[error("mask {mask:#x} does not fit a {width}-bit field")]
    MaskExceedsWidth { mask: u32, width: Width },
    #[error("value {value:#x} has bits outside mask {mask:#x}")]
    ValueOutsideMask { value: u32, mask: u32 },
    #[error("shift amount {amount} is not below 32")]
    ShiftTooLarge { amount: u8 },
}

/// A program that cannot be merged into a classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    #[error("filter program has no steps")]
    Empty,
    #[error("filter program has {len} steps, at most {max} are allowed")]
    TooLong { len: usize, max: usize },
    #[error("step {level} is malformed: {reason}")]
    Bogus { level: usize, reason: BogusReason },
}

/// Find the first thing wrong with `step`, if anything.
pub(crate) fn check_step(step: &Step) -> Option<BogusReason> {
    let width = step.shape.width;
    let mask = step.shape.mask;
    if !width.fits(mask) {
        return Some(BogusReason::MaskExceedsWidth { mask, width });
    }
    match step.kind {
        StepKind::Eq { value } if value & !mask != 0 => {
            Some(BogusReason::ValueOutsideMask { value, mask })
        }
        StepKind::Shift { amount } if amount >= 32 => Some(BogusReason::ShiftTooLarge { amount }),
        StepKind::Eq { .. } | StepKind::Shift { .. } => None,
    }
}

/// Assign levels and alignment hints.
///
/// The base pointer starts out [`MESSAGE_ALIGN`]-aligned. A shift by `n`
/// over a mask whose lowest set bit is `b` moves it by a multiple of
/// `2^(n + b)`, which bounds the alignment of everything after it.
pub(crate) fn annotate(steps: &mut [Step]) {
    let mut base_align = MESSAGE_ALIGN;
    for (level, step) in steps.iter_mut().enumerate() {
        step.level = u16::try_from(level).unwrap_or(u16::MAX);
        step.align = address_align(base_align, step.shape.offset);
        if let StepKind::Shift { amount } = step.kind {
            let zeros = step.shape.mask.trailing_zeros() + u32::from(amount);
            let shift_align = 1u32.checked_shl(zeros).unwrap_or(u32::MAX);
            base_align = base_align.min(shift_align);
        }
    }
}

fn address_align(base_align: u32, offset: u32) -> u32 {
    if offset == 0 {
        base_align
    } else {
        base_align.min(1 << offset.trailing_zeros())
    }
}
