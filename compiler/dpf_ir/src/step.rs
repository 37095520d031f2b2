//! IR steps: the individual tests a filter program is made of.

use std::fmt;

use crate::MESSAGE_ALIGN;

/// Width of a message field read by a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    W8,
    W16,
    W32,
}

impl Width {
    /// Number of bits in a field of this width.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
        }
    }

    /// Number of bytes in a field of this width.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
        }
    }

    /// Mask with every bit of the field set.
    #[inline]
    pub const fn full_mask(self) -> u32 {
        match self {
            Self::W8 => 0xFF,
            Self::W16 => 0xFFFF,
            Self::W32 => 0xFFFF_FFFF,
        }
    }

    /// Returns `true` if `bits` has no bits set outside this width.
    #[inline]
    pub const fn fits(self, bits: u32) -> bool {
        bits & !self.full_mask() == 0
    }

    /// The next wider field width, if any.
    pub const fn doubled(self) -> Option<Self> {
        match self {
            Self::W8 => Some(Self::W16),
            Self::W16 => Some(Self::W32),
            Self::W32 => None,
        }
    }

    /// Read a big-endian field of this width at byte position `at`.
    ///
    /// Returns `None` if the field extends past the end of `msg`.
    #[inline]
    pub fn load(self, msg: &[u8], at: usize) -> Option<u32> {
        let end = at.checked_add(self.bytes())?;
        let bytes = msg.get(at..end)?;
        Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Where and how a step reads the message: offset from the base pointer,
/// field width, and the mask applied to the loaded field.
///
/// Two equality steps with the same shape are mutually exclusive whenever
/// their values differ, which is what makes them candidates for hashing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shape {
    pub offset: u32,
    pub width: Width,
    pub mask: u32,
}

impl Shape {
    /// Load the masked field at `base + offset`.
    #[inline]
    pub fn load(self, msg: &[u8], base: usize) -> Option<u32> {
        let offset = usize::try_from(self.offset).ok()?;
        let at = base.checked_add(offset)?;
        self.width.load(msg, at).map(|field| field & self.mask)
    }
}

/// The operation a step performs on the loaded field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Pass iff the masked field equals `value`.
    Eq { value: u32 },
    /// Advance the base pointer by `masked field << amount`.
    Shift { amount: u8 },
}

/// One step of a filter program.
///
/// `level` is the position of the step in its program and `align` is the
/// largest power of two known to divide the address the step reads.
/// Neither takes part in structural equality ([`Step::same_test`]): two
/// programs reaching the same trie depth through the same prefix always agree
/// on both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Step {
    pub shape: Shape,
    pub kind: StepKind,
    pub level: u16,
    pub align: u32,
}

impl Step {
    /// An unvalidated equality step at level 0.
    ///
    /// Programs assembled from raw steps go through [`Program::from_steps`],
    /// which renumbers levels; use [`crate::ProgramBuilder`] for checked
    /// construction.
    ///
    /// [`Program::from_steps`]: crate::Program::from_steps
    pub const fn equality(offset: u32, width: Width, mask: u32, value: u32) -> Self {
        Self {
            shape: Shape {
                offset,
                width,
                mask,
            },
            kind: StepKind::Eq { value },
            level: 0,
            align: MESSAGE_ALIGN,
        }
    }

    /// An unvalidated shift step at level 0.
    pub const fn shift(offset: u32, width: Width, mask: u32, amount: u8) -> Self {
        Self {
            shape: Shape {
                offset,
                width,
                mask,
            },
            kind: StepKind::Shift { amount },
            level: 0,
            align: MESSAGE_ALIGN,
        }
    }

    /// Structural equality: same kind, offset, width, mask, and (for
    /// equality steps) the same value.
    #[inline]
    pub fn same_test(&self, other: &Step) -> bool {
        self.shape == other.shape && self.kind == other.kind
    }

    /// The comparison value of an equality step.
    #[inline]
    pub fn value(&self) -> Option<u32> {
        match self.kind {
            StepKind::Eq { value } => Some(value),
            StepKind::Shift { .. } => None,
        }
    }

    #[inline]
    pub fn is_eq(&self) -> bool {
        matches!(self.kind, StepKind::Eq { .. })
    }

    /// How many message bits this step discriminates on.
    ///
    /// Shift steps never reject a message (short of running off its end),
    /// so they score zero.
    #[inline]
    pub fn specificity(&self) -> u32 {
        match self.kind {
            StepKind::Eq { .. } => self.shape.mask.count_ones(),
            StepKind::Shift { .. } => 0,
        }
    }

    /// Execute the step against `msg` with the base pointer at `base`.
    ///
    /// Returns the base pointer for the next step, or `None` if the test
    /// fails or reads past the end of the message.
    #[inline]
    pub fn run(&self, msg: &[u8], base: usize) -> Option<usize> {
        let field = self.shape.load(msg, base)?;
        match self.kind {
            StepKind::Eq { value } => (field == value).then_some(base),
            StepKind::Shift { amount } => base.checked_add(shifted(field, amount)?),
        }
    }
}

/// Compute `field << amount` as a base pointer displacement.
#[inline]
fn shifted(field: u32, amount: u8) -> Option<usize> {
    let delta = u64::from(field).checked_shl(u32::from(amount))?;
    usize::try_from(delta).ok()
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Shape {
            offset,
            width,
            mask,
        } = self.shape;
        match self.kind {
            StepKind::Eq { value } => {
                write!(f, "eq{width} [{offset}] & {mask:#x} == {value:#x}")
            }
            StepKind::Shift { amount } => {
                write!(f, "shift{width} [{offset}] & {mask:#x} << {amount}")
            }
        }
    }
}

#[cfg(test)]
mod tests;
