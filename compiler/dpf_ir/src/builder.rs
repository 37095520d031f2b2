//! Incremental construction of filter programs.

use std::mem;

use crate::program::{check_step, Program};
use crate::step::{Step, Width};
use crate::MAX_STEPS;

/// Accumulates the steps of one filter program.
///
/// Offsets passed to the builder are relative to the current base pointer.
/// [`shifti`](Self::shifti) moves the base pointer by a constant; instead of
/// emitting a step, the displacement is kept as a *pending offset* and added
/// to the offset of every step emitted afterwards, so any number of constant
/// adjustments collapse into the offsets themselves.
///
/// Misuse is a programming error and panics: a mask wider than its field, an
/// equality value with bits outside its mask, a shift of 32 or more, or more
/// than [`MAX_STEPS`] steps.
///
/// ```
/// use dpf_ir::ProgramBuilder;
///
/// // Ethernet type IPv4, IP protocol UDP.
/// let udp = ProgramBuilder::new().eq16(12, 0x0800).eq8(23, 17).finish();
/// assert_eq!(udp.len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    steps: Vec<Step>,
    pending: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps emitted so far.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    // Equality tests

    /// Test `(field & mask) == value` for a field of `width` at `offset`.
    pub fn eq(&mut self, width: Width, offset: u32, mask: u32, value: u32) -> &mut Self {
        let offset = self.resolve(offset);
        self.push(Step::equality(offset, width, mask, value))
    }

    pub fn eq8(&mut self, offset: u32, value: u32) -> &mut Self {
        self.eq(Width::W8, offset, Width::W8.full_mask(), value)
    }

    pub fn eq16(&mut self, offset: u32, value: u32) -> &mut Self {
        self.eq(Width::W16, offset, Width::W16.full_mask(), value)
    }

    pub fn eq32(&mut self, offset: u32, value: u32) -> &mut Self {
        self.eq(Width::W32, offset, Width::W32.full_mask(), value)
    }

    pub fn meq8(&mut self, offset: u32, mask: u32, value: u32) -> &mut Self {
        self.eq(Width::W8, offset, mask, value)
    }

    pub fn meq16(&mut self, offset: u32, mask: u32, value: u32) -> &mut Self {
        self.eq(Width::W16, offset, mask, value)
    }

    pub fn meq32(&mut self, offset: u32, mask: u32, value: u32) -> &mut Self {
        self.eq(Width::W32, offset, mask, value)
    }

    // Base pointer movement

    /// Advance the base pointer by `(field & mask) << amount`.
    pub fn shift(&mut self, width: Width, offset: u32, mask: u32, amount: u8) -> &mut Self {
        let offset = self.resolve(offset);
        self.push(Step::shift(offset, width, mask, amount))
    }

    pub fn shift8(&mut self, offset: u32, amount: u8) -> &mut Self {
        self.shift(Width::W8, offset, Width::W8.full_mask(), amount)
    }

    pub fn shift16(&mut self, offset: u32, amount: u8) -> &mut Self {
        self.shift(Width::W16, offset, Width::W16.full_mask(), amount)
    }

    pub fn shift32(&mut self, offset: u32, amount: u8) -> &mut Self {
        self.shift(Width::W32, offset, Width::W32.full_mask(), amount)
    }

    pub fn mshift8(&mut self, offset: u32, mask: u32, amount: u8) -> &mut Self {
        self.shift(Width::W8, offset, mask, amount)
    }

    pub fn mshift16(&mut self, offset: u32, mask: u32, amount: u8) -> &mut Self {
        self.shift(Width::W16, offset, mask, amount)
    }

    pub fn mshift32(&mut self, offset: u32, mask: u32, amount: u8) -> &mut Self {
        self.shift(Width::W32, offset, mask, amount)
    }

    /// Advance the base pointer by a constant. Emits no step.
    pub fn shifti(&mut self, bytes: u32) -> &mut Self {
        let Some(pending) = self.pending.checked_add(bytes) else {
            panic!("shift-immediate of {bytes} overflows pending offset {}", self.pending);
        };
        self.pending = pending;
        self
    }

    /// Take the accumulated program, leaving the builder empty.
    pub fn finish(&mut self) -> Program {
        self.pending = 0;
        Program::from_steps(mem::take(&mut self.steps))
    }

    fn resolve(&self, offset: u32) -> u32 {
        let Some(resolved) = offset.checked_add(self.pending) else {
            panic!(
                "offset {offset} plus pending offset {} overflows",
                self.pending
            );
        };
        resolved
    }

    fn push(&mut self, step: Step) -> &mut Self {
        assert!(
            self.steps.len() < MAX_STEPS,
            "filter program exceeds {MAX_STEPS} steps"
        );
        if let Some(reason) = check_step(&step) {
            panic!("malformed filter step {}: {reason}", self.steps.len());
        }
        self.steps.push(step);
        self
    }
}

#[cfg(test)]
mod tests;
